//! Wire-level shapes exchanged with the MDB service.
//!
//! These are the decoded forms of the service messages; the transport is
//! responsible for getting them on and off the wire. Statement text is
//! opaque here apart from literal substitution (`interpolate.rs`).

pub mod interpolate;

pub use interpolate::{
    InterpolateOptions, SkipReason, count_placeholders, interpolate, interpolate_bytes,
};

use bytes::Bytes;
use std::fmt;

/// Logical column type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    ByteArray,
    String,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Bool,
    Timestamp,
    Uuid,
    /// Tag this driver does not understand.
    Unknown(i32),
}

impl Datatype {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Datatype::ByteArray,
            1 => Datatype::String,
            2 => Datatype::Int8,
            3 => Datatype::Uint8,
            4 => Datatype::Int16,
            5 => Datatype::Uint16,
            6 => Datatype::Int32,
            7 => Datatype::Uint32,
            8 => Datatype::Int64,
            9 => Datatype::Uint64,
            10 => Datatype::Float32,
            11 => Datatype::Float64,
            14 => Datatype::Bool,
            15 => Datatype::Timestamp,
            16 => Datatype::Uuid,
            other => Datatype::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Datatype::ByteArray => 0,
            Datatype::String => 1,
            Datatype::Int8 => 2,
            Datatype::Uint8 => 3,
            Datatype::Int16 => 4,
            Datatype::Uint16 => 5,
            Datatype::Int32 => 6,
            Datatype::Uint32 => 7,
            Datatype::Int64 => 8,
            Datatype::Uint64 => 9,
            Datatype::Float32 => 10,
            Datatype::Float64 => 11,
            Datatype::Bool => 14,
            Datatype::Timestamp => 15,
            Datatype::Uuid => 16,
            Datatype::Unknown(code) => code,
        }
    }

    /// Upper-case database type name; `UNDEF` for unknown tags.
    pub fn type_name(self) -> &'static str {
        match self {
            Datatype::ByteArray => "BYTEARRAY",
            Datatype::String => "STRING",
            Datatype::Int8 => "INT8",
            Datatype::Uint8 => "UINT8",
            Datatype::Int16 => "INT16",
            Datatype::Uint16 => "UINT16",
            Datatype::Int32 => "INT32",
            Datatype::Uint32 => "UINT32",
            Datatype::Int64 => "INT64",
            Datatype::Uint64 => "UINT64",
            Datatype::Float32 => "FLOAT32",
            Datatype::Float64 => "FLOAT64",
            Datatype::Bool => "BOOL",
            Datatype::Timestamp => "TIMESTAMP",
            Datatype::Uuid => "UUID",
            Datatype::Unknown(_) => "UNDEF",
        }
    }

    /// Fixed encoded width in bytes; `None` for variable-width types.
    pub fn width(self) -> Option<usize> {
        match self {
            Datatype::Int8 | Datatype::Uint8 | Datatype::Bool => Some(1),
            Datatype::Int16 | Datatype::Uint16 => Some(2),
            Datatype::Int32 | Datatype::Uint32 | Datatype::Float32 => Some(4),
            Datatype::Int64 | Datatype::Uint64 | Datatype::Float64 | Datatype::Timestamp => {
                Some(8)
            }
            Datatype::Uuid => Some(16),
            Datatype::ByteArray | Datatype::String | Datatype::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Result-set schema carried by the first chunk of each result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub table_name: String,
    pub column_names: Vec<String>,
    pub column_types: Vec<Datatype>,
    /// Declared sizes of variable-width columns, when the server sends them.
    pub column_sizes: Vec<i64>,
    /// One bit per column (MSB-first), set when the column may be NULL.
    pub nullable_bitmap: Option<Vec<u8>>,
}

impl Schema {
    pub fn new(column_names: Vec<String>, column_types: Vec<Datatype>) -> Self {
        Self {
            column_names,
            column_types,
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn width(&self) -> usize {
        self.column_types.len()
    }

    /// Column names as exposed to callers (`table.column` when a table is set).
    pub fn qualified_names(&self) -> Vec<String> {
        if self.table_name.is_empty() {
            return self.column_names.clone();
        }
        self.column_names
            .iter()
            .map(|c| format!("{}.{}", self.table_name, c))
            .collect()
    }
}

/// One row as received: raw column bytes plus its null bitmap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub columns: Vec<Bytes>,
    /// One bit per column (MSB-first), set when the column is NULL.
    pub null_bitmap: Vec<u8>,
}

/// One element of a query response stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryChunk {
    /// Present when this chunk begins a new result set.
    pub schema: Option<Schema>,
    pub rows: Vec<RawRow>,
    /// Set on the last chunk of the last result set.
    pub done: bool,
}

/// Session token issued by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthToken(pub Bytes);

/// Server status flags reported at initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStatus {
    /// Backslash is not an escape character; quotes are doubled instead.
    pub no_backslash_escapes: bool,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitRequest {
    pub user: String,
    pub password: String,
    pub db_name: String,
    pub client_found_rows: bool,
    /// Free-form DSN parameters forwarded to the session.
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub auth: AuthToken,
    pub status: ServerStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub auth: AuthToken,
    /// Statement text; byte arguments may make it non-UTF-8.
    pub statement: Bytes,
    pub max_row_count: i32,
    pub fetch_size: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub auth: AuthToken,
    pub statement: Bytes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResponse {
    pub affected_rows: i64,
    pub last_insert_id: i64,
}

/// Isolation level requested for a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginRequest {
    pub auth: AuthToken,
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeginResponse {
    pub xact_id: Bytes,
}
