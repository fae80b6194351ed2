//! Transactions.

use bytes::Bytes;

use super::connection::Connection;
use super::rows::Rows;
use crate::error::{ErrorKind, MdbError, MdbResult};
use crate::protocol::ExecResponse;
use crate::types::Arg;

/// An open transaction on a [`Connection`].
///
/// `commit()` and `rollback()` send `COMMIT` / `ROLLBACK` and detach from the
/// connection; any later use fails with [`MdbError::InvalidConn`].
pub struct Transaction<'c> {
    conn: Option<&'c Connection>,
    id: Bytes,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(conn: &'c Connection, id: Bytes) -> Self {
        Self {
            conn: Some(conn),
            id,
        }
    }

    /// Server-assigned transaction id.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn is_finished(&self) -> bool {
        self.conn.is_none()
    }

    pub async fn exec(&self, statement: &str, args: &[Arg]) -> MdbResult<ExecResponse> {
        self.conn()?.exec(statement, args).await
    }

    pub async fn query(&self, statement: &str, args: &[Arg]) -> MdbResult<Rows> {
        self.conn()?.query(statement, args).await
    }

    pub async fn commit(&mut self) -> MdbResult<()> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(&mut self) -> MdbResult<()> {
        self.finish("ROLLBACK").await
    }

    fn conn(&self) -> MdbResult<&'c Connection> {
        self.conn.ok_or(MdbError::InvalidConn)
    }

    /// Send `COMMIT` / `ROLLBACK`. The transaction stays attached when the
    /// statement never reached the server (busy connection), so the caller
    /// can close its cursor and retry.
    async fn finish(&mut self, statement: &'static str) -> MdbResult<()> {
        let conn = self.conn()?;
        tracing::debug!("{} transaction", statement);
        match conn.exec(statement, &[]).await {
            Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::Skip) => Err(e),
            result => {
                self.conn = None;
                result.map(|_| ())
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::warn!("Transaction dropped without commit or rollback");
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
