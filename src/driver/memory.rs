//! Scripted in-memory transport.
//!
//! Responses are queued up front; every request is recorded so callers can
//! assert on what reached the "server". Clones share state, so a test keeps
//! one handle while the connection owns another.
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! transport.push_query(vec![first_chunk, last_chunk]);
//! let driver = Driver::new(Arc::new(transport.dialer()));
//! let conn = driver.open("/main").await?;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::transport::{Dialer, ResponseStream, Transport, TransportError};
use crate::config::Config;
use crate::protocol::{
    AuthToken, BeginRequest, BeginResponse, ExecRequest, ExecResponse, InitRequest, QueryChunk,
    QueryRequest, Schema, Session,
};

type StreamScript = Vec<Result<QueryChunk, TransportError>>;

/// Snapshot of how often each transport operation was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub dial: usize,
    pub initialize: usize,
    pub query: usize,
    pub exec: usize,
    pub begin: usize,
    pub ping: usize,
    pub close: usize,
    pub close_send: usize,
}

#[derive(Default)]
struct Counters {
    dial: AtomicUsize,
    initialize: AtomicUsize,
    query: AtomicUsize,
    exec: AtomicUsize,
    begin: AtomicUsize,
    ping: AtomicUsize,
    close: AtomicUsize,
    close_send: AtomicUsize,
}

#[derive(Default)]
struct Shared {
    session: Mutex<Session>,
    queries: Mutex<VecDeque<Result<StreamScript, TransportError>>>,
    execs: Mutex<VecDeque<Result<ExecResponse, TransportError>>>,
    init_requests: Mutex<Vec<InitRequest>>,
    query_requests: Mutex<Vec<QueryRequest>>,
    statements: Mutex<Vec<Bytes>>,
    begins: Mutex<Vec<BeginRequest>>,
    fail_ping: AtomicBool,
    fail_dial: Mutex<Option<TransportError>>,
    recv_delay: Mutex<Option<Duration>>,
    counters: Counters,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let transport = Self::default();
        *lock(&transport.shared.session) = Session {
            auth: AuthToken(Bytes::from_static(b"memory-session")),
            ..Session::default()
        };
        transport
    }

    /// Session returned by `initialize`.
    pub fn set_session(&self, session: Session) {
        *lock(&self.shared.session) = session;
    }

    /// Queue the chunks for the next query.
    pub fn push_query(&self, chunks: Vec<QueryChunk>) {
        lock(&self.shared.queries).push_back(Ok(chunks.into_iter().map(Ok).collect()));
    }

    /// Queue a stream that may fail part way through.
    pub fn push_query_stream(&self, items: StreamScript) {
        lock(&self.shared.queries).push_back(Ok(items));
    }

    /// Make the next query submission itself fail.
    pub fn push_query_error(&self, err: TransportError) {
        lock(&self.shared.queries).push_back(Err(err));
    }

    pub fn push_exec(&self, resp: ExecResponse) {
        lock(&self.shared.execs).push_back(Ok(resp));
    }

    pub fn push_exec_error(&self, err: TransportError) {
        lock(&self.shared.execs).push_back(Err(err));
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.shared.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_dial(&self, err: Option<TransportError>) {
        *lock(&self.shared.fail_dial) = err;
    }

    /// Delay every chunk delivery.
    pub fn set_recv_delay(&self, delay: Option<Duration>) {
        *lock(&self.shared.recv_delay) = delay;
    }

    /// Statements submitted through `query` and `exec`, in order, as text.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.shared.statements)
            .iter()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }

    /// Submitted statements as sent, including non-UTF-8 bytes.
    pub fn raw_statements(&self) -> Vec<Bytes> {
        lock(&self.shared.statements).clone()
    }

    pub fn query_requests(&self) -> Vec<QueryRequest> {
        lock(&self.shared.query_requests).clone()
    }

    pub fn init_requests(&self) -> Vec<InitRequest> {
        lock(&self.shared.init_requests).clone()
    }

    pub fn begin_requests(&self) -> Vec<BeginRequest> {
        lock(&self.shared.begins).clone()
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.shared.counters;
        CallCounts {
            dial: c.dial.load(Ordering::SeqCst),
            initialize: c.initialize.load(Ordering::SeqCst),
            query: c.query.load(Ordering::SeqCst),
            exec: c.exec.load(Ordering::SeqCst),
            begin: c.begin.load(Ordering::SeqCst),
            ping: c.ping.load(Ordering::SeqCst),
            close: c.close.load(Ordering::SeqCst),
            close_send: c.close_send.load(Ordering::SeqCst),
        }
    }

    /// A dialer handing out handles to this transport.
    pub fn dialer(&self) -> MemoryDialer {
        MemoryDialer {
            transport: self.clone(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn initialize(&self, req: InitRequest) -> Result<Session, TransportError> {
        bump(&self.shared.counters.initialize);
        lock(&self.shared.init_requests).push(req);
        Ok(lock(&self.shared.session).clone())
    }

    async fn query(&self, req: QueryRequest) -> Result<Box<dyn ResponseStream>, TransportError> {
        bump(&self.shared.counters.query);
        lock(&self.shared.statements).push(req.statement.clone());
        lock(&self.shared.query_requests).push(req);

        // Unscripted queries answer with one empty, final result set.
        let script = lock(&self.shared.queries).pop_front().unwrap_or_else(|| {
            Ok(vec![Ok(QueryChunk {
                schema: Some(Schema::default()),
                rows: Vec::new(),
                done: true,
            })])
        })?;

        Ok(Box::new(MemoryStream {
            items: script.into(),
            shared: self.shared.clone(),
            send_closed: false,
        }))
    }

    async fn exec(&self, req: ExecRequest) -> Result<ExecResponse, TransportError> {
        bump(&self.shared.counters.exec);
        lock(&self.shared.statements).push(req.statement);
        lock(&self.shared.execs)
            .pop_front()
            .unwrap_or(Ok(ExecResponse::default()))
    }

    async fn begin(&self, req: BeginRequest) -> Result<BeginResponse, TransportError> {
        let n = self.shared.counters.begin.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.shared.begins).push(req);
        Ok(BeginResponse {
            xact_id: Bytes::from(format!("xact-{}", n)),
        })
    }

    async fn ping(&self, _auth: &AuthToken) -> Result<(), TransportError> {
        bump(&self.shared.counters.ping);
        if self.shared.fail_ping.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("ping failed".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        bump(&self.shared.counters.close);
        Ok(())
    }
}

struct MemoryStream {
    items: VecDeque<Result<QueryChunk, TransportError>>,
    shared: Arc<Shared>,
    send_closed: bool,
}

#[async_trait]
impl ResponseStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<QueryChunk>, TransportError> {
        if self.send_closed {
            return Err(TransportError::Cancelled);
        }
        let delay = *lock(&self.shared.recv_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.items.pop_front().transpose()
    }

    fn close_send(&mut self) {
        if !self.send_closed {
            self.send_closed = true;
            bump(&self.shared.counters.close_send);
        }
    }
}

#[derive(Clone)]
pub struct MemoryDialer {
    transport: MemoryTransport,
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, _config: &Config) -> Result<Box<dyn Transport>, TransportError> {
        bump(&self.transport.shared.counters.dial);
        let failure = lock(&self.transport.shared.fail_dial).clone();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(Box::new(self.transport.clone()))
    }
}
