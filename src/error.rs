//! Error types for the MDB driver.
//!
//! Every component keeps its own error enum (`BitmapError`, `DsnError`,
//! `SkipReason`, `DecodeError`, `TransportError`); they bubble up unmodified
//! inside [`MdbError`], and callers branch on [`MdbError::kind`].

use thiserror::Error;

use crate::bitmap::BitmapError;
use crate::config::DsnError;
use crate::driver::TransportError;
use crate::protocol::SkipReason;
use crate::types::{DecodeError, TypeError};

/// Coarse classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The DSN violates the connection-string grammar.
    Parse,
    /// A value in the configuration is malformed, unknown, or unsupported.
    Config,
    /// Client-side interpolation cannot handle the statement; the caller may
    /// fall back to server-side binding.
    Skip,
    /// The connection is unusable and must be discarded.
    BadConn,
    /// A bit index was out of range.
    Range,
    /// A query is already active on the connection.
    Busy,
    /// A decoded value could not be converted to the requested Rust type.
    Type,
}

/// The main error type for driver operations.
#[derive(Debug, Error)]
pub enum MdbError {
    #[error(transparent)]
    Dsn(#[from] DsnError),

    #[error(transparent)]
    Bitmap(#[from] BitmapError),

    /// Interpolation fast path refused the statement.
    #[error("interpolation skipped: {0}")]
    Skip(#[from] SkipReason),

    /// Column bytes did not match their declared type.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A column value did not convert to the requested type.
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// The transport failed or reported a stream error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A configured deadline elapsed.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Protocol violation or use of a dead connection.
    #[error("bad connection: {0}")]
    BadConn(String),

    /// The transaction (or cursor) was already finished.
    #[error("invalid connection")]
    InvalidConn,

    /// Single-active-query rule violated.
    #[error("query already active on this connection")]
    Busy,

    /// Configuration error outside the DSN grammar.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MdbError {
    /// Create a bad-connection error with a message.
    pub fn bad_conn(message: impl Into<String>) -> Self {
        Self::BadConn(message.into())
    }

    /// Create a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MdbError::Dsn(e) => e.kind(),
            MdbError::Bitmap(_) => ErrorKind::Range,
            MdbError::Skip(_) => ErrorKind::Skip,
            MdbError::Decode(_)
            | MdbError::Transport(_)
            | MdbError::Timeout(_)
            | MdbError::BadConn(_)
            | MdbError::InvalidConn => ErrorKind::BadConn,
            MdbError::Busy => ErrorKind::Busy,
            MdbError::Type(_) => ErrorKind::Type,
            MdbError::Config(_) | MdbError::Io(_) => ErrorKind::Config,
        }
    }

    /// True when the connection that produced this error must be discarded.
    pub fn is_bad_conn(&self) -> bool {
        self.kind() == ErrorKind::BadConn
    }

    /// True when the caller may retry with server-side binding.
    pub fn is_skip(&self) -> bool {
        self.kind() == ErrorKind::Skip
    }
}

/// Result type alias for driver operations.
pub type MdbResult<T> = Result<T, MdbError>;
