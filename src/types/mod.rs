//! Column values and statement arguments.
//!
//! `decode_column` turns the raw little-endian bytes of one column into a
//! [`Value`] according to its [`Datatype`]; [`FromValue`] converts decoded
//! values into Rust types for `Row::get`.

mod arg;

pub use arg::Arg;

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::Datatype;

/// Failure to decode raw column bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{datatype} column expects {expected} bytes, got {got}")]
    Width {
        datatype: Datatype,
        expected: usize,
        got: usize,
    },
    #[error("unknown column type tag {0}")]
    UnknownType(i32),
    #[error("invalid UTF-8 in STRING column")]
    InvalidUtf8,
    #[error("row has {got} columns, schema has {expected}")]
    RowWidth { expected: usize, got: usize },
}

/// Failure to convert a decoded value into a Rust type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("unexpected NULL value")]
    UnexpectedNull,
    #[error("expected {expected}, got {got}")]
    Mismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error("value out of range for {0}")]
    OutOfRange(&'static str),
    #[error("no column {0}")]
    NoSuchColumn(String),
}

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// Every integer type except UINT64, widened.
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    /// STRING columns and UUIDs (canonical hyphenated form).
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "integer",
            Value::UInt(_) => "unsigned integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Bytes(v) => {
                write!(f, "0x")?;
                for b in v {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Text(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

fn array<const N: usize>(raw: &[u8], datatype: Datatype) -> Result<[u8; N], DecodeError> {
    raw.try_into().map_err(|_| DecodeError::Width {
        datatype,
        expected: N,
        got: raw.len(),
    })
}

/// Decode one non-null column.
pub fn decode_column(raw: &[u8], datatype: Datatype) -> Result<Value, DecodeError> {
    let value = match datatype {
        Datatype::ByteArray => Value::Bytes(raw.to_vec()),
        Datatype::String => Value::Text(
            std::str::from_utf8(raw)
                .map_err(|_| DecodeError::InvalidUtf8)?
                .to_owned(),
        ),
        Datatype::Int8 => Value::Int(i64::from(i8::from_le_bytes(array(raw, datatype)?))),
        Datatype::Uint8 => Value::Int(i64::from(u8::from_le_bytes(array(raw, datatype)?))),
        Datatype::Int16 => Value::Int(i64::from(i16::from_le_bytes(array(raw, datatype)?))),
        Datatype::Uint16 => Value::Int(i64::from(u16::from_le_bytes(array(raw, datatype)?))),
        Datatype::Int32 => Value::Int(i64::from(i32::from_le_bytes(array(raw, datatype)?))),
        Datatype::Uint32 => Value::Int(i64::from(u32::from_le_bytes(array(raw, datatype)?))),
        Datatype::Int64 => Value::Int(i64::from_le_bytes(array(raw, datatype)?)),
        Datatype::Uint64 => Value::UInt(u64::from_le_bytes(array(raw, datatype)?)),
        Datatype::Float32 => Value::Float(f64::from(f32::from_le_bytes(array(raw, datatype)?))),
        Datatype::Float64 => Value::Float(f64::from_le_bytes(array(raw, datatype)?)),
        Datatype::Bool => {
            let [b] = array::<1>(raw, datatype)?;
            Value::Bool(b as i8 == 1)
        }
        Datatype::Timestamp => {
            let nanos = i64::from_le_bytes(array(raw, datatype)?);
            Value::Timestamp(DateTime::from_timestamp_nanos(nanos))
        }
        Datatype::Uuid => Value::Text(Uuid::from_bytes(array(raw, datatype)?).to_string()),
        Datatype::Unknown(code) => return Err(DecodeError::UnknownType(code)),
    };
    Ok(value)
}

/// Conversion from a decoded [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, TypeError>;
}

fn mismatch<T>(expected: &'static str, value: &Value) -> Result<T, TypeError> {
    match value {
        Value::Null => Err(TypeError::UnexpectedNull),
        other => Err(TypeError::Mismatch {
            expected,
            got: other.kind(),
        }),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::UInt(v) => i64::try_from(*v).map_err(|_| TypeError::OutOfRange("i64")),
            other => mismatch("integer", other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        i32::try_from(i64::from_value(value)?).map_err(|_| TypeError::OutOfRange("i32"))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::UInt(v) => Ok(*v),
            Value::Int(v) => u64::try_from(*v).map_err(|_| TypeError::OutOfRange("u64")),
            other => mismatch("unsigned integer", other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Float(v) => Ok(*v),
            other => mismatch("float", other),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => mismatch("bool", other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            other => mismatch("text", other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            Value::Text(v) => Ok(v.as_bytes().to_vec()),
            other => mismatch("bytes", other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Timestamp(v) => Ok(*v),
            other => mismatch("timestamp", other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::Text(v) => Uuid::parse_str(v).map_err(|_| TypeError::Mismatch {
                expected: "uuid",
                got: "text",
            }),
            other => mismatch("uuid", other),
        }
    }
}
