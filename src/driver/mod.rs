//! MDB Driver Module
//!
//! Connection and result handling is split across modules:
//! - `connection.rs` - session setup, query / exec submission, liveness, close
//! - `rows.rs` - streaming result-set cursor and row decoding
//! - `column.rs` - column type introspection
//! - `statement.rs` - client-side prepared statements
//! - `transaction.rs` - begin / commit / rollback
//! - `transport.rs` - transport and dialer traits
//! - `memory.rs` - scripted in-memory transport

mod column;
mod connection;
mod memory;
mod rows;
mod statement;
mod transaction;
mod transport;

pub use column::{ColumnType, ScanType};
pub use connection::{Connection, TxOptions};
pub use memory::{CallCounts, MemoryDialer, MemoryTransport};
pub use rows::{Row, Rows, RowsProgress, decode_row};
pub use statement::Statement;
pub use transaction::Transaction;
pub use transport::{Dialer, ResponseStream, Transport, TransportError};

use std::sync::Arc;

use crate::config::{Config, Registry, parse_dsn};
use crate::error::MdbResult;

/// A normalized, private configuration plus the dialer that connects it.
#[derive(Clone)]
pub struct Connector {
    config: Arc<Config>,
    dialer: Arc<dyn Dialer>,
}

impl Connector {
    /// Clone and normalize `config`; later changes to the caller's copy do
    /// not affect this connector.
    pub fn new(config: &Config, registry: &Registry, dialer: Arc<dyn Dialer>) -> MdbResult<Self> {
        let mut config = config.clone();
        config.normalize(registry)?;
        Ok(Self {
            config: Arc::new(config),
            dialer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn connect(&self) -> MdbResult<Connection> {
        Connection::connect(self.config.clone(), self.dialer.as_ref()).await
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("dsn", &self.config.format_dsn())
            .finish()
    }
}

/// Entry point: resolves DSNs against a registry and opens connections.
///
/// # Example
/// ```ignore
/// let driver = Driver::new(Arc::new(dialer));
/// let conn = driver.open("app@tcp(db.internal)/ledger?interpolateParams=true").await?;
/// let mut rows = conn.query("SELECT * FROM t WHERE id = ?", &[42.into()]).await?;
/// while let Some(row) = rows.next_row().await? {
///     println!("{:?}", row.values());
/// }
/// ```
#[derive(Clone)]
pub struct Driver {
    registry: Arc<Registry>,
    dialer: Arc<dyn Dialer>,
}

impl Driver {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self::with_registry(Arc::new(Registry::new()), dialer)
    }

    pub fn with_registry(registry: Arc<Registry>, dialer: Arc<dyn Dialer>) -> Self {
        Self { registry, dialer }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parse a DSN into a connector without connecting.
    pub fn open_connector(&self, dsn: &str) -> MdbResult<Connector> {
        let config = parse_dsn(dsn, &self.registry)?;
        Ok(Connector {
            config: Arc::new(config),
            dialer: self.dialer.clone(),
        })
    }

    /// Connector for an existing configuration.
    pub fn connector(&self, config: &Config) -> MdbResult<Connector> {
        Connector::new(config, &self.registry, self.dialer.clone())
    }

    /// Parse a DSN and connect.
    pub async fn open(&self, dsn: &str) -> MdbResult<Connection> {
        self.open_connector(dsn)?.connect().await
    }
}
