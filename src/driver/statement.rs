//! Client-side prepared statements.
//!
//! The service has no server-side prepare; a `Statement` keeps the text and
//! its placeholder count and goes through the normal interpolation path.

use super::connection::Connection;
use super::rows::Rows;
use crate::error::{MdbError, MdbResult};
use crate::protocol::{ExecResponse, SkipReason, count_placeholders};
use crate::types::Arg;

#[derive(Debug)]
pub struct Statement<'c> {
    conn: &'c Connection,
    text: String,
    num_input: usize,
}

impl<'c> Statement<'c> {
    pub(crate) fn new(conn: &'c Connection, text: &str) -> Self {
        Self {
            conn,
            text: text.to_string(),
            num_input: count_placeholders(text),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of `?` placeholders.
    pub fn num_input(&self) -> usize {
        self.num_input
    }

    pub async fn query(&self, args: &[Arg]) -> MdbResult<Rows> {
        self.check_args(args)?;
        self.conn.query(&self.text, args).await
    }

    pub async fn exec(&self, args: &[Arg]) -> MdbResult<ExecResponse> {
        self.check_args(args)?;
        self.conn.exec(&self.text, args).await
    }

    fn check_args(&self, args: &[Arg]) -> MdbResult<()> {
        if args.len() != self.num_input {
            return Err(MdbError::Skip(SkipReason::ArgCount {
                placeholders: self.num_input,
                args: args.len(),
            }));
        }
        Ok(())
    }
}
