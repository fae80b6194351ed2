//! Connection configuration.
//!
//! A [`Config`] is parsed from a DSN (`dsn.rs`), normalized against a
//! [`Registry`] of named TLS policies and public keys, and then treated as
//! read-only: connectors take a clone.
//!
//! - `dsn.rs` - DSN grammar, parameter parsing, formatting
//! - `duration.rs` - `1m30s` style durations
//! - `registry.rs` - named TLS policies / server public keys
//! - `tls.rs` - TLS policy and rustls client config
//! - `profile.rs` - named DSNs from the user config file

mod dsn;
pub mod duration;
mod profile;
mod registry;
mod tls;

pub use dsn::{join_host_port, parse_bool, parse_dsn, parse_dsn_fields, split_host_port};
pub use profile::{Profile, Profiles};
pub use registry::Registry;
pub use tls::{ServerPubKey, TlsPolicy};

use std::collections::BTreeMap;
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;

use crate::error::ErrorKind;

/// Port appended to TCP addresses that do not carry one.
pub const DEFAULT_ADDR_PORT: &str = "8080";
/// Address used for `unix` when none is given.
pub const DEFAULT_UNIX_ADDR: &str = "/tmp/mdb.sock";
/// Largest statement the interpolator will build (64 MiB).
pub const DEFAULT_MAX_ALLOWED_PACKET: usize = 64 << 20;
/// Rows per chunk requested from the server.
pub const DEFAULT_FETCH_SIZE: i32 = 10_000;
/// Row limit per query; `0` means unlimited.
pub const DEFAULT_MAX_ROW_COUNT: i32 = 0;

/// DSN and configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DsnError {
    #[error("invalid DSN: did you forget to escape a param value?")]
    Unescaped,
    #[error("invalid DSN: network address not terminated (missing closing brace)")]
    AddrNotTerminated,
    #[error("invalid DSN: missing the slash separating the database name")]
    MissingSlash,
    #[error("invalid bool value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid {key} value: {value}")]
    InvalidInt { key: String, value: String },
    #[error("invalid duration for {key}: {value}")]
    InvalidDuration { key: String, value: String },
    #[error("invalid escape sequence in {key}: {value}")]
    InvalidEscape { key: String, value: String },
    #[error("unknown time zone: {0}")]
    UnknownLocation(String),
    #[error("option '{0}' is not supported")]
    Unsupported(&'static str),
    #[error("default addr for network '{0}' unknown")]
    UnknownNetwork(String),
    #[error("invalid value / unknown config name: {0}")]
    UnknownTlsConfig(String),
    #[error("invalid value / unknown server pub key name: {0}")]
    UnknownServerPubKey(String),
    #[error("TLS config name '{0}' is reserved")]
    ReservedTlsName(String),
}

impl DsnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DsnError::Unescaped | DsnError::AddrNotTerminated | DsnError::MissingSlash => {
                ErrorKind::Parse
            }
            _ => ErrorKind::Config,
        }
    }
}

/// Configuration parsed from a DSN string.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub user: String,
    pub password: String,
    /// Network kind: `tcp` or `unix`.
    pub net: String,
    pub addr: String,
    pub db_name: String,
    /// Unrecognized parameters, kept sorted.
    pub params: BTreeMap<String, String>,
    /// Zone used when rendering timestamps into statements.
    pub loc: Tz,
    pub max_allowed_packet: usize,
    /// Name of a registered server public key.
    pub server_pub_key: String,
    /// `true`, `false`, `skip-verify`, `preferred` or a registered policy name.
    pub tls_config: String,
    pub timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,

    pub check_conn_liveness: bool,
    /// Report matched rather than changed rows.
    pub client_found_rows: bool,
    pub interpolate_params: bool,
    pub parse_time: bool,
    pub reject_read_only: bool,
    pub max_row_count: i32,
    pub fetch_size: i32,

    pub_key: Option<ServerPubKey>,
    tls: Option<TlsPolicy>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            net: String::new(),
            addr: String::new(),
            db_name: String::new(),
            params: BTreeMap::new(),
            loc: Tz::UTC,
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            server_pub_key: String::new(),
            tls_config: String::new(),
            timeout: None,
            read_timeout: None,
            write_timeout: None,
            check_conn_liveness: true,
            client_found_rows: false,
            interpolate_params: false,
            parse_time: false,
            reject_read_only: false,
            max_row_count: DEFAULT_MAX_ROW_COUNT,
            fetch_size: DEFAULT_FETCH_SIZE,
            pub_key: None,
            tls: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved TLS policy; `None` means plaintext.
    pub fn tls(&self) -> Option<&TlsPolicy> {
        self.tls.as_ref()
    }

    /// Resolved server public key.
    pub fn pub_key(&self) -> Option<&ServerPubKey> {
        self.pub_key.as_ref()
    }

    /// Fill defaults and resolve named objects. Idempotent.
    pub fn normalize(&mut self, registry: &Registry) -> Result<(), DsnError> {
        if self.net.is_empty() {
            self.net = "tcp".to_string();
        }

        if self.addr.is_empty() {
            self.addr = match self.net.as_str() {
                "tcp" => format!("127.0.0.1:{}", DEFAULT_ADDR_PORT),
                "unix" => DEFAULT_UNIX_ADDR.to_string(),
                other => return Err(DsnError::UnknownNetwork(other.to_string())),
            };
        } else if self.net == "tcp" {
            self.addr = ensure_have_port(&self.addr);
        }

        self.tls = match self.tls_config.as_str() {
            "" | "false" => None,
            "true" => Some(TlsPolicy::verified()),
            "skip-verify" | "preferred" => Some(TlsPolicy::skip_verify()),
            name => Some(
                registry
                    .tls_config(name)
                    .ok_or_else(|| DsnError::UnknownTlsConfig(name.to_string()))?,
            ),
        };

        if let Some(tls) = self.tls.as_mut() {
            if tls.server_name.is_none() && !tls.insecure_skip_verify {
                if let Some((host, _)) = split_host_port(&self.addr) {
                    tls.server_name = Some(host.to_string());
                }
            }
        }

        self.pub_key = if self.server_pub_key.is_empty() {
            None
        } else {
            Some(
                registry
                    .server_pub_key(&self.server_pub_key)
                    .ok_or_else(|| DsnError::UnknownServerPubKey(self.server_pub_key.clone()))?,
            )
        };

        Ok(())
    }
}

fn ensure_have_port(addr: &str) -> String {
    if split_host_port(addr).is_some() {
        return addr.to_string();
    }
    // Bracketed IPv6 literal without a port.
    if let Some(host) = addr.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        return join_host_port(host, DEFAULT_ADDR_PORT);
    }
    join_host_port(addr, DEFAULT_ADDR_PORT)
}
