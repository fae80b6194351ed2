//! Connection lifecycle: initialization, statement submission, liveness,
//! close.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;

use super::rows::Rows;
use super::statement::Statement;
use super::transaction::Transaction;
use super::transport::{Dialer, Transport, TransportError};
use crate::config::Config;
use crate::error::{MdbError, MdbResult};
use crate::protocol::{
    BeginRequest, ExecRequest, ExecResponse, InitRequest, InterpolateOptions, IsolationLevel,
    QueryRequest, ServerStatus, Session, SkipReason, interpolate_bytes,
};
use crate::types::Arg;

/// Flags shared between a connection and the cursors it hands out.
#[derive(Debug, Default)]
pub(crate) struct ConnState {
    closed: AtomicBool,
    active_query: AtomicBool,
    bad: AtomicBool,
    reset: AtomicBool,
}

impl ConnState {
    pub(crate) fn mark_bad(&self) {
        self.bad.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Holds the single-active-query slot; released on drop.
#[derive(Debug)]
pub(crate) struct QueryGuard {
    state: Arc<ConnState>,
    released: bool,
}

impl QueryGuard {
    fn acquire(state: &Arc<ConnState>) -> MdbResult<Self> {
        state
            .active_query
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MdbError::Busy)?;
        Ok(Self {
            state: state.clone(),
            released: false,
        })
    }

    pub(crate) fn state(&self) -> &Arc<ConnState> {
        &self.state
    }

    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.active_query.store(false, Ordering::Release);
        }
    }
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Options for [`Connection::begin`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

/// Await `fut`, bounded by `limit` when set.
pub(crate) async fn with_deadline<T, F>(
    limit: Option<Duration>,
    what: &'static str,
    fut: F,
) -> MdbResult<T>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| MdbError::Timeout(what))?
            .map_err(MdbError::from),
        None => fut.await.map_err(MdbError::from),
    }
}

/// A connection to an MDB service.
///
/// Only one query may be active at a time: a second `query` / `exec` while a
/// [`Rows`] cursor is open fails with [`MdbError::Busy`] without reaching the
/// transport.
pub struct Connection {
    config: Arc<Config>,
    transport: Box<dyn Transport>,
    session: Session,
    state: Arc<ConnState>,
}

impl Connection {
    /// Dial and initialize a session. `timeout` bounds both steps.
    pub async fn connect(config: Arc<Config>, dialer: &dyn Dialer) -> MdbResult<Self> {
        tracing::debug!("Connecting to {}({}) db={}", config.net, config.addr, config.db_name);

        let transport = with_deadline(config.timeout, "dial", dialer.dial(&config)).await?;

        let req = InitRequest {
            user: config.user.clone(),
            password: config.password.clone(),
            db_name: config.db_name.clone(),
            client_found_rows: config.client_found_rows,
            params: config
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let session = match with_deadline(config.timeout, "connect", transport.initialize(req)).await
        {
            Ok(session) => session,
            Err(e) => {
                let _ = transport.close().await;
                return Err(e);
            }
        };

        if config.reject_read_only && session.status.read_only {
            let _ = transport.close().await;
            return Err(MdbError::bad_conn("server session is read-only"));
        }

        tracing::info!("Connected to {} (db={})", config.addr, config.db_name);

        Ok(Self {
            config,
            transport,
            session,
            state: Arc::new(ConnState::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> ServerStatus {
        self.session.status
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// False once the connection is closed or a transport failure marked it bad.
    pub fn is_valid(&self) -> bool {
        !self.is_closed() && !self.state.bad.load(Ordering::Acquire)
    }

    /// True while a cursor holds the active-query slot.
    pub fn has_active_query(&self) -> bool {
        self.state.active_query.load(Ordering::Acquire)
    }

    /// Mark the connection as returned to a pool; the next operation checks
    /// liveness first when `checkConnLiveness` is set.
    pub fn reset_session(&self) {
        self.state.reset.store(true, Ordering::Release);
    }

    /// Run a statement that returns rows.
    pub async fn query(&self, statement: &str, args: &[Arg]) -> MdbResult<Rows> {
        self.ensure_usable()?;
        let guard = QueryGuard::acquire(&self.state)?;
        self.check_liveness().await?;

        let statement = self.render(statement, args)?;
        tracing::debug!("Submitting query: {}", String::from_utf8_lossy(&statement));

        let req = QueryRequest {
            auth: self.session.auth.clone(),
            statement,
            max_row_count: self.config.max_row_count,
            fetch_size: self.config.fetch_size,
        };
        let mut stream = with_deadline(self.config.write_timeout, "write", self.transport.query(req))
            .await
            .map_err(|e| self.mark_bad(e))?;

        let first = with_deadline(self.config.read_timeout, "read", stream.recv())
            .await
            .map_err(|e| self.mark_bad(e))?;

        let Some(mut first) = first else {
            return Err(self.mark_bad(MdbError::bad_conn("query returned an empty stream")));
        };
        let schema = first.schema.take().unwrap_or_default();

        Ok(Rows::new(
            stream,
            schema,
            first.rows,
            first.done,
            guard,
            self.config.read_timeout,
        ))
    }

    /// Run a statement that does not return rows.
    pub async fn exec(&self, statement: &str, args: &[Arg]) -> MdbResult<ExecResponse> {
        self.ensure_usable()?;
        let _guard = QueryGuard::acquire(&self.state)?;
        self.check_liveness().await?;

        let statement = self.render(statement, args)?;
        tracing::debug!("Submitting exec: {}", String::from_utf8_lossy(&statement));

        let req = ExecRequest {
            auth: self.session.auth.clone(),
            statement,
        };
        with_deadline(self.config.write_timeout, "write", self.transport.exec(req))
            .await
            .map_err(|e| self.mark_bad(e))
    }

    /// Prepare a statement; its input count is the number of `?` placeholders.
    pub fn prepare(&self, statement: &str) -> Statement<'_> {
        Statement::new(self, statement)
    }

    /// Start a transaction.
    pub async fn begin(&self, options: TxOptions) -> MdbResult<Transaction<'_>> {
        self.ensure_usable()?;
        self.check_liveness().await?;

        let req = BeginRequest {
            auth: self.session.auth.clone(),
            isolation: options.isolation,
            read_only: options.read_only,
        };
        let resp = with_deadline(self.config.write_timeout, "write", self.transport.begin(req))
            .await
            .map_err(|e| self.mark_bad(e))?;

        tracing::debug!("Transaction started ({} byte id)", resp.xact_id.len());
        Ok(Transaction::new(self, resp.xact_id))
    }

    /// Close the connection. Idempotent; the transport is notified once.
    /// A cursor still open on this connection fails on its next read.
    pub async fn close(&self) -> MdbResult<()> {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("Closing connection to {}", self.config.addr);
        self.transport.close().await.map_err(MdbError::from)
    }

    fn ensure_usable(&self) -> MdbResult<()> {
        if self.is_closed() {
            return Err(MdbError::bad_conn("connection is closed"));
        }
        if self.state.bad.load(Ordering::Acquire) {
            return Err(MdbError::bad_conn("connection was marked bad"));
        }
        Ok(())
    }

    async fn check_liveness(&self) -> MdbResult<()> {
        if !self.config.check_conn_liveness || !self.state.reset.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        with_deadline(
            self.config.read_timeout,
            "ping",
            self.transport.ping(&self.session.auth),
        )
        .await
        .map_err(|e| self.mark_bad(e))
    }

    /// Inline arguments into the statement text.
    fn render(&self, statement: &str, args: &[Arg]) -> MdbResult<Bytes> {
        if args.is_empty() {
            return Ok(Bytes::copy_from_slice(statement.as_bytes()));
        }
        if !self.config.interpolate_params {
            return Err(SkipReason::Disabled.into());
        }
        let opts = InterpolateOptions::new(&self.config, self.session.status);
        Ok(interpolate_bytes(statement, args, &opts)?)
    }

    fn mark_bad(&self, err: MdbError) -> MdbError {
        if err.is_bad_conn() {
            tracing::warn!("Marking connection bad: {}", err);
            self.state.mark_bad();
        }
        err
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.config.addr)
            .field("db_name", &self.config.db_name)
            .field("closed", &self.is_closed())
            .field("active_query", &self.has_active_query())
            .finish()
    }
}
