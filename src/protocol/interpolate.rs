//! Client-side literal interpolation.
//!
//! Replaces each `?` in a statement with the next argument rendered as a
//! literal, so a parameterized statement can be sent as plain text. Any
//! argument the encoder cannot render safely makes the whole call fail with
//! a [`SkipReason`]; nothing is ever partially encoded.
//!
//! Placeholders are found by a plain byte scan: a `?` inside a quoted string
//! literal counts as a placeholder too.

use std::fmt::Write;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::config::{Config, DEFAULT_MAX_ALLOWED_PACKET};
use crate::protocol::ServerStatus;
use crate::types::Arg;

/// Unix seconds of `0001-01-01T00:00:00Z`, the zero timestamp.
const ZERO_TIME_UNIX: i64 = -62_135_596_800;

/// Why interpolation declined a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("statement has {placeholders} placeholders but {args} arguments were given")]
    ArgCount { placeholders: usize, args: usize },
    #[error("interpolated statement exceeds {max} bytes")]
    TooLarge { max: usize },
    #[error("argument of type {0} cannot be inlined")]
    UnsupportedType(&'static str),
    #[error("year is not in the range [1, 9999]: {0}")]
    InvalidTimestamp(i32),
    #[error("interpolated statement is not valid UTF-8")]
    NotUtf8,
    #[error("interpolateParams is disabled")]
    Disabled,
}

/// Settings that affect literal rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolateOptions {
    pub max_allowed_packet: usize,
    /// Zone timestamps are converted to before rendering.
    pub loc: Tz,
    /// Double `"` instead of backslash-escaping.
    pub no_backslash_escapes: bool,
}

impl Default for InterpolateOptions {
    fn default() -> Self {
        Self {
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            loc: Tz::UTC,
            no_backslash_escapes: false,
        }
    }
}

impl InterpolateOptions {
    pub fn new(config: &Config, status: ServerStatus) -> Self {
        Self {
            max_allowed_packet: config.max_allowed_packet,
            loc: config.loc,
            no_backslash_escapes: status.no_backslash_escapes,
        }
    }
}

/// Number of `?` placeholders in a statement.
pub fn count_placeholders(statement: &str) -> usize {
    statement.bytes().filter(|&b| b == b'?').count()
}

/// Inline `args` into `statement`, returning text.
///
/// Fails with [`SkipReason::NotUtf8`] when a byte argument is not valid
/// UTF-8; the driver sends [`interpolate_bytes`] output instead.
pub fn interpolate(
    statement: &str,
    args: &[Arg],
    opts: &InterpolateOptions,
) -> Result<String, SkipReason> {
    let buf = interpolate_bytes(statement, args, opts)?;
    String::from_utf8(buf.to_vec()).map_err(|_| SkipReason::NotUtf8)
}

/// Inline `args` into `statement`. Byte arguments are copied as is (after
/// escaping), so the result need not be UTF-8.
pub fn interpolate_bytes(
    statement: &str,
    args: &[Arg],
    opts: &InterpolateOptions,
) -> Result<Bytes, SkipReason> {
    let placeholders = count_placeholders(statement);
    if placeholders != args.len() {
        return Err(SkipReason::ArgCount {
            placeholders,
            args: args.len(),
        });
    }

    let mut buf = BytesMut::with_capacity(statement.len());
    let mut rest = statement;
    let mut consumed = 0;

    while let Some(q) = rest.find('?') {
        buf.extend_from_slice(rest[..q].as_bytes());
        rest = &rest[q + 1..];

        let arg = args.get(consumed).ok_or(SkipReason::ArgCount {
            placeholders,
            args: args.len(),
        })?;
        consumed += 1;

        encode_arg(&mut buf, arg, opts)?;

        if buf.len() > opts.max_allowed_packet {
            return Err(SkipReason::TooLarge {
                max: opts.max_allowed_packet,
            });
        }
    }
    buf.extend_from_slice(rest.as_bytes());

    if buf.len() > opts.max_allowed_packet {
        return Err(SkipReason::TooLarge {
            max: opts.max_allowed_packet,
        });
    }
    if consumed != args.len() {
        return Err(SkipReason::ArgCount {
            placeholders,
            args: args.len(),
        });
    }

    Ok(buf.freeze())
}

/// Render one argument as a literal.
fn encode_arg(buf: &mut BytesMut, arg: &Arg, opts: &InterpolateOptions) -> Result<(), SkipReason> {
    match arg {
        Arg::Null => buf.extend_from_slice(b"NULL"),

        Arg::Int(n) => {
            let mut tmp = itoa::Buffer::new();
            buf.extend_from_slice(tmp.format(*n).as_bytes());
        }

        Arg::UInt(n) => {
            let mut tmp = itoa::Buffer::new();
            buf.extend_from_slice(tmp.format(*n).as_bytes());
        }

        Arg::Float(n) => {
            if !n.is_finite() {
                return Err(SkipReason::UnsupportedType("non-finite float"));
            }
            let mut tmp = ryu::Buffer::new();
            buf.extend_from_slice(tmp.format_finite(*n).as_bytes());
        }

        Arg::Bool(b) => buf.extend_from_slice(if *b { b"1" } else { b"0" }),

        Arg::Timestamp(ts) => encode_timestamp(buf, ts, opts.loc)?,

        Arg::Text(s) => encode_quoted(buf, s.as_bytes(), opts.no_backslash_escapes),

        Arg::Bytes(b) | Arg::Raw(b) => encode_quoted(buf, b, opts.no_backslash_escapes),

        Arg::Uuid(u) => {
            let mut tmp = [0u8; 36];
            buf.extend_from_slice(b"\"");
            buf.extend_from_slice(u.hyphenated().encode_lower(&mut tmp).as_bytes());
            buf.extend_from_slice(b"\"");
        }

        Arg::List(_) => return Err(SkipReason::UnsupportedType("list")),
    }
    Ok(())
}

/// `'0000-00-00'` for the zero timestamp, otherwise
/// `"YYYY-MM-DD[ HH:MM:SS[.nnnnnnnnn]]"` in the configured zone.
fn encode_timestamp(buf: &mut BytesMut, ts: &DateTime<Utc>, loc: Tz) -> Result<(), SkipReason> {
    if ts.timestamp() == ZERO_TIME_UNIX && ts.timestamp_subsec_nanos() == 0 {
        buf.extend_from_slice(b"'0000-00-00'");
        return Ok(());
    }

    let local = ts.with_timezone(&loc);
    let year = local.year();
    if !(1..=9999).contains(&year) {
        return Err(SkipReason::InvalidTimestamp(year));
    }

    buf.extend_from_slice(b"\"");
    let _ = write!(buf, "{:04}-{:02}-{:02}", year, local.month(), local.day());
    let (h, m, s) = (local.hour(), local.minute(), local.second());
    let nanos = local.nanosecond();
    if h != 0 || m != 0 || s != 0 || nanos != 0 {
        let _ = write!(buf, " {:02}:{:02}:{:02}", h, m, s);
        if nanos != 0 {
            let _ = write!(buf, ".{:09}", nanos);
        }
    }
    buf.extend_from_slice(b"\"");
    Ok(())
}

fn encode_quoted(buf: &mut BytesMut, v: &[u8], no_backslash_escapes: bool) {
    buf.reserve(v.len() + 2);
    buf.extend_from_slice(b"\"");
    if no_backslash_escapes {
        for &c in v {
            if c == b'"' {
                buf.extend_from_slice(b"\"\"");
            } else {
                buf.extend_from_slice(&[c]);
            }
        }
    } else {
        for &c in v {
            match c {
                0 => buf.extend_from_slice(b"\\0"),
                b'\n' => buf.extend_from_slice(b"\\n"),
                b'\r' => buf.extend_from_slice(b"\\r"),
                0x1a => buf.extend_from_slice(b"\\Z"),
                b'\'' => buf.extend_from_slice(b"\\'"),
                b'"' => buf.extend_from_slice(b"\\\""),
                b'\\' => buf.extend_from_slice(b"\\\\"),
                _ => buf.extend_from_slice(&[c]),
            }
        }
    }
    buf.extend_from_slice(b"\"");
}
