use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// A statement argument to be inlined as a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Text(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    /// Pre-encoded payload (e.g. JSON), quoted and escaped like text.
    Raw(Vec<u8>),
    /// Collections cannot be inlined.
    List(Vec<Arg>),
}

impl Arg {
    pub fn kind(&self) -> &'static str {
        match self {
            Arg::Null => "null",
            Arg::Int(_) => "int",
            Arg::UInt(_) => "uint",
            Arg::Float(_) => "float",
            Arg::Bool(_) => "bool",
            Arg::Bytes(_) => "bytes",
            Arg::Text(_) => "text",
            Arg::Timestamp(_) => "timestamp",
            Arg::Uuid(_) => "uuid",
            Arg::Raw(_) => "raw",
            Arg::List(_) => "list",
        }
    }
}

macro_rules! int_args {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Self {
                Arg::Int(i64::from(v))
            }
        })*
    };
}

int_args!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Arg {
    fn from(v: u64) -> Self {
        Arg::UInt(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(f64::from(v))
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::Text(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::Text(v)
    }
}

impl From<&[u8]> for Arg {
    fn from(v: &[u8]) -> Self {
        Arg::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Arg {
    fn from(v: Vec<u8>) -> Self {
        Arg::Bytes(v)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Arg {
    fn from(v: DateTime<Tz>) -> Self {
        Arg::Timestamp(v.with_timezone(&Utc))
    }
}

impl From<Uuid> for Arg {
    fn from(v: Uuid) -> Self {
        Arg::Uuid(v)
    }
}

impl From<serde_json::Value> for Arg {
    fn from(v: serde_json::Value) -> Self {
        Arg::Raw(v.to_string().into_bytes())
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(v: Vec<Arg>) -> Self {
        Arg::List(v)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        v.map_or(Arg::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Arg::from(21i32), Arg::Int(21));
        assert_eq!(Arg::from(7u64), Arg::UInt(7));
        assert_eq!(Arg::from("john"), Arg::Text("john".into()));
        assert_eq!(Arg::from(None::<i64>), Arg::Null);
        assert_eq!(Arg::from(Some(true)), Arg::Bool(true));
        assert_eq!(
            Arg::from(serde_json::json!({"a": 1})),
            Arg::Raw(br#"{"a":1}"#.to_vec())
        );
        assert_eq!(Arg::from(vec![Arg::Null]).kind(), "list");
    }
}
