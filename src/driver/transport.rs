//! Transport seam.
//!
//! The driver core never touches bytes on a socket; it talks to the service
//! through these traits. A production build plugs in an RPC client, tests
//! use [`MemoryTransport`](super::MemoryTransport).

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::protocol::{
    AuthToken, BeginRequest, BeginResponse, ExecRequest, ExecResponse, InitRequest, QueryChunk,
    QueryRequest, Session,
};

/// Failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("stream closed")]
    Closed,
}

/// Receiving half of a query response.
#[async_trait]
pub trait ResponseStream: Send {
    /// Next chunk; `Ok(None)` once the server has finished the stream.
    async fn recv(&mut self) -> Result<Option<QueryChunk>, TransportError>;

    /// Tell the server no more chunks are wanted. Must not block.
    fn close_send(&mut self);
}

/// One established session with the service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn initialize(&self, req: InitRequest) -> Result<Session, TransportError>;

    async fn query(&self, req: QueryRequest) -> Result<Box<dyn ResponseStream>, TransportError>;

    async fn exec(&self, req: ExecRequest) -> Result<ExecResponse, TransportError>;

    async fn begin(&self, req: BeginRequest) -> Result<BeginResponse, TransportError>;

    /// Liveness check.
    async fn ping(&self, _auth: &AuthToken) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens transports for a normalized [`Config`].
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, config: &Config) -> Result<Box<dyn Transport>, TransportError>;
}
