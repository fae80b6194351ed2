//! DSN grammar: `[user[:password]@][net[(addr)]]/dbname[?param1=value1&...]`.

use std::fmt::Write;

use chrono_tz::Tz;

use super::duration::{format_duration, parse_duration};
use super::{Config, DEFAULT_FETCH_SIZE, DEFAULT_MAX_ALLOWED_PACKET, DEFAULT_MAX_ROW_COUNT};
use super::{DsnError, Registry};

/// Parse and normalize a DSN.
pub fn parse_dsn(dsn: &str, registry: &Registry) -> Result<Config, DsnError> {
    let mut cfg = parse_dsn_fields(dsn)?;
    cfg.normalize(registry)?;
    Ok(cfg)
}

/// Parse a DSN into a `Config` without filling defaults or resolving names.
pub fn parse_dsn_fields(dsn: &str) -> Result<Config, DsnError> {
    let mut cfg = Config::new();

    // The password or the address may contain a '/', so split on the last one.
    let Some(slash) = dsn.rfind('/') else {
        if dsn.is_empty() {
            return Ok(cfg);
        }
        return Err(DsnError::MissingSlash);
    };

    if slash > 0 {
        let prefix = &dsn[..slash];

        let net_start = match prefix.rfind('@') {
            Some(at) => {
                let creds = &prefix[..at];
                match creds.split_once(':') {
                    Some((user, password)) => {
                        cfg.user = user.to_string();
                        cfg.password = password.to_string();
                    }
                    None => cfg.user = creds.to_string(),
                }
                at + 1
            }
            None => 0,
        };

        let net = &prefix[net_start..];
        match net.find('(') {
            Some(open) => {
                if !net.ends_with(')') {
                    if net[open + 1..].contains(')') {
                        return Err(DsnError::Unescaped);
                    }
                    return Err(DsnError::AddrNotTerminated);
                }
                cfg.addr = net[open + 1..net.len() - 1].to_string();
                cfg.net = net[..open].to_string();
            }
            None => cfg.net = net.to_string(),
        }
    }

    let tail = &dsn[slash + 1..];
    match tail.split_once('?') {
        Some((db_name, query)) => {
            parse_params(&mut cfg, query)?;
            cfg.db_name = db_name.to_string();
        }
        None => cfg.db_name = tail.to_string(),
    }

    Ok(cfg)
}

fn parse_params(cfg: &mut Config, query: &str) -> Result<(), DsnError> {
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };

        match key {
            "checkConnLiveness" => cfg.check_conn_liveness = bool_param(key, value)?,
            "clientFoundRows" => cfg.client_found_rows = bool_param(key, value)?,
            "interpolateParams" => cfg.interpolate_params = bool_param(key, value)?,
            "parseTime" => cfg.parse_time = bool_param(key, value)?,
            "rejectReadOnly" => cfg.reject_read_only = bool_param(key, value)?,

            "maxRowCount" => cfg.max_row_count = int_param(key, value)?,
            "fetchSize" => cfg.fetch_size = int_param(key, value)?,
            "maxAllowedPacket" => cfg.max_allowed_packet = int_param(key, value)?,

            "timeout" => cfg.timeout = duration_param(key, value)?,
            "readTimeout" => cfg.read_timeout = duration_param(key, value)?,
            "writeTimeout" => cfg.write_timeout = duration_param(key, value)?,

            "loc" => {
                let name = unescape(key, value)?;
                cfg.loc = if name.is_empty() {
                    Tz::UTC
                } else {
                    name.parse::<Tz>()
                        .map_err(|_| DsnError::UnknownLocation(name.clone()))?
                };
            }

            "serverPubKey" => cfg.server_pub_key = unescape(key, value)?,

            "tls" => {
                cfg.tls_config = match parse_bool(value) {
                    Some(b) => b.to_string(),
                    None => {
                        let lower = value.to_ascii_lowercase();
                        if lower == "skip-verify" || lower == "preferred" {
                            lower
                        } else {
                            unescape(key, value)?
                        }
                    }
                };
            }

            "compress" => return Err(DsnError::Unsupported("compress")),
            "strict" => return Err(DsnError::Unsupported("strict")),

            _ => {
                let value = unescape(key, value)?;
                cfg.params.insert(key.to_string(), value);
            }
        }
    }
    Ok(())
}

/// Boolean spellings accepted in DSN parameters.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "TRUE" | "True" => Some(true),
        "0" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn bool_param(key: &str, value: &str) -> Result<bool, DsnError> {
    parse_bool(value).ok_or_else(|| DsnError::InvalidBool {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn int_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DsnError> {
    value.parse().map_err(|_| DsnError::InvalidInt {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Zero means "no timeout".
fn duration_param(key: &str, value: &str) -> Result<Option<std::time::Duration>, DsnError> {
    let d = parse_duration(value).ok_or_else(|| DsnError::InvalidDuration {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    Ok((!d.is_zero()).then_some(d))
}

/// Query-string unescape: `+` is a space, `%XX` a byte.
fn unescape(key: &str, value: &str) -> Result<String, DsnError> {
    let invalid = || DsnError::InvalidEscape {
        key: key.to_string(),
        value: value.to_string(),
    };

    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !ok {
                return Err(invalid());
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|_| invalid())
}

fn escape(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Split `host:port` / `[v6]:port`. `None` when there is no port or the
/// host is an unbracketed IPv6 literal.
pub fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let close = rest.find(']')?;
        let host = &rest[..close];
        let port = rest[close + 1..].strip_prefix(':')?;
        if port.contains(':') {
            return None;
        }
        return Some((host, port));
    }

    let (host, port) = addr.rsplit_once(':')?;
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return None;
    }
    Some((host, port))
}

/// Join host and port, bracketing IPv6 hosts.
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

struct ParamWriter<'a> {
    buf: &'a mut String,
    has_param: bool,
}

impl ParamWriter<'_> {
    fn write(&mut self, name: &str, value: &str) {
        self.buf.push(if self.has_param { '&' } else { '?' });
        self.has_param = true;
        self.buf.push_str(name);
        self.buf.push('=');
        self.buf.push_str(value);
    }
}

impl Config {
    /// Format this configuration as a DSN accepted by [`parse_dsn`].
    ///
    /// Only settings that differ from their defaults are written, in a fixed
    /// order, followed by free-form parameters sorted by key.
    pub fn format_dsn(&self) -> String {
        let mut buf = String::new();

        if !self.user.is_empty() {
            buf.push_str(&self.user);
            if !self.password.is_empty() {
                buf.push(':');
                buf.push_str(&self.password);
            }
            buf.push('@');
        }

        if !self.net.is_empty() {
            buf.push_str(&self.net);
            if !self.addr.is_empty() {
                let _ = write!(buf, "({})", self.addr);
            }
        }

        buf.push('/');
        buf.push_str(&self.db_name);

        let mut w = ParamWriter {
            buf: &mut buf,
            has_param: false,
        };

        if !self.check_conn_liveness {
            w.write("checkConnLiveness", "false");
        }
        if self.client_found_rows {
            w.write("clientFoundRows", "true");
        }
        if self.fetch_size != DEFAULT_FETCH_SIZE {
            w.write("fetchSize", itoa::Buffer::new().format(self.fetch_size));
        }
        if self.interpolate_params {
            w.write("interpolateParams", "true");
        }
        if self.loc != Tz::UTC {
            w.write("loc", &escape(self.loc.name()));
        }
        if self.max_row_count != DEFAULT_MAX_ROW_COUNT {
            w.write("maxRowCount", itoa::Buffer::new().format(self.max_row_count));
        }
        if self.parse_time {
            w.write("parseTime", "true");
        }
        if let Some(d) = self.read_timeout {
            w.write("readTimeout", &format_duration(d));
        }
        if self.reject_read_only {
            w.write("rejectReadOnly", "true");
        }
        if !self.server_pub_key.is_empty() {
            w.write("serverPubKey", &escape(&self.server_pub_key));
        }
        if let Some(d) = self.timeout {
            w.write("timeout", &format_duration(d));
        }
        if !self.tls_config.is_empty() {
            w.write("tls", &escape(&self.tls_config));
        }
        if let Some(d) = self.write_timeout {
            w.write("writeTimeout", &format_duration(d));
        }
        if self.max_allowed_packet != DEFAULT_MAX_ALLOWED_PACKET {
            w.write(
                "maxAllowedPacket",
                itoa::Buffer::new().format(self.max_allowed_packet),
            );
        }

        for (key, value) in &self.params {
            w.write(key, &escape(value));
        }

        buf
    }
}
