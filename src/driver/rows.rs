//! Forward-only cursor over a streamed query response.
//!
//! Rows arrive in chunks. The cursor buffers one chunk, decodes rows lazily,
//! and pulls the next chunk only when the current one is exhausted. A chunk
//! that carries a schema starts a new result set; it is parked until the
//! caller advances with [`Rows::advance_result_set`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::column::ColumnType;
use super::connection::{QueryGuard, with_deadline};
use super::transport::ResponseStream;
use crate::bitmap::{Bit, get_bit_in};
use crate::error::{MdbError, MdbResult};
use crate::protocol::{QueryChunk, RawRow, Schema};
use crate::types::{DecodeError, FromValue, TypeError, Value, decode_column};

/// One decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Typed access by position.
    pub fn get<T: FromValue>(&self, idx: usize) -> Result<T, TypeError> {
        let value = self
            .values
            .get(idx)
            .ok_or_else(|| TypeError::NoSuchColumn(idx.to_string()))?;
        T::from_value(value)
    }

    /// Typed access by (possibly table-qualified) column name.
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T, TypeError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TypeError::NoSuchColumn(name.to_string()))?;
        self.get(idx)
    }
}

/// Read-only view of a cursor's progress, usable from other tasks.
#[derive(Debug, Clone, Default)]
pub struct RowsProgress {
    rows: Arc<AtomicU64>,
    result_set: Arc<AtomicUsize>,
}

impl RowsProgress {
    /// Rows handed out so far, over all result sets.
    pub fn rows_read(&self) -> u64 {
        self.rows.load(Ordering::Acquire)
    }

    /// Zero-based index of the current result set.
    pub fn result_set(&self) -> usize {
        self.result_set.load(Ordering::Acquire)
    }
}

pub struct Rows {
    stream: Option<Box<dyn ResponseStream>>,
    schema: Schema,
    columns: Arc<[String]>,
    buffer: Vec<RawRow>,
    pos: AtomicUsize,
    /// Current chunk is the last chunk of the last result set.
    last_chunk: bool,
    /// Server ended the stream.
    stream_ended: bool,
    /// First chunk of the next result set, not yet installed.
    pending: Option<QueryChunk>,
    failed: bool,
    closed: bool,
    guard: QueryGuard,
    read_timeout: Option<Duration>,
    progress: RowsProgress,
}

impl Rows {
    pub(crate) fn new(
        stream: Box<dyn ResponseStream>,
        schema: Schema,
        rows: Vec<RawRow>,
        done: bool,
        guard: QueryGuard,
        read_timeout: Option<Duration>,
    ) -> Self {
        let columns = schema.qualified_names().into();
        Self {
            stream: Some(stream),
            schema,
            columns,
            buffer: rows,
            pos: AtomicUsize::new(0),
            last_chunk: done,
            stream_ended: false,
            pending: None,
            failed: false,
            closed: false,
            guard,
            read_timeout,
            progress: RowsProgress::default(),
        }
    }

    /// Column names of the current result set, `table.column` when the
    /// schema names a table.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column_types(&self) -> Vec<ColumnType> {
        ColumnType::from_schema(&self.schema, &self.columns)
    }

    pub fn progress(&self) -> RowsProgress {
        self.progress.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next row of the current result set.
    ///
    /// Returns `Ok(None)` at the end of the result set; check
    /// [`has_next_result_set`](Self::has_next_result_set) to see whether
    /// another follows.
    pub async fn next_row(&mut self) -> MdbResult<Option<Row>> {
        loop {
            self.ensure_open()?;

            if self.pos.load(Ordering::Acquire) < self.buffer.len() {
                let pos = self.pos.fetch_add(1, Ordering::AcqRel);
                let row = self.decode(pos)?;
                self.progress.rows.fetch_add(1, Ordering::AcqRel);
                return Ok(Some(row));
            }

            if self.pending.is_some() || self.exhausted() {
                return Ok(None);
            }

            match self.recv().await? {
                None => return Ok(None),
                Some(chunk) if chunk.schema.is_some() => {
                    self.pending = Some(chunk);
                    return Ok(None);
                }
                Some(chunk) => {
                    tracing::debug!("Continuation chunk with {} rows", chunk.rows.len());
                    self.buffer = chunk.rows;
                    self.pos.store(0, Ordering::Release);
                    self.last_chunk = chunk.done;
                }
            }
        }
    }

    /// Collect the remaining rows of the current result set.
    pub async fn collect_rows(&mut self) -> MdbResult<Vec<Row>> {
        let mut out = Vec::new();
        while let Some(row) = self.next_row().await? {
            out.push(row);
        }
        Ok(out)
    }

    /// Whether another result set follows the current one.
    ///
    /// Continuation chunks of the current result set that have not been
    /// read yet are discarded while looking ahead.
    pub async fn has_next_result_set(&mut self) -> MdbResult<bool> {
        self.ensure_open()?;
        if self.pending.is_some() {
            return Ok(true);
        }
        while !self.exhausted() {
            match self.recv().await? {
                None => return Ok(false),
                Some(chunk) if chunk.schema.is_some() => {
                    self.pending = Some(chunk);
                    return Ok(true);
                }
                Some(chunk) => {
                    tracing::debug!("Discarding {} rows of current result set", chunk.rows.len());
                    self.last_chunk = chunk.done;
                }
            }
        }
        Ok(false)
    }

    /// Skip the rest of the current result set and install the next one.
    /// `Ok(false)` when no result set remains.
    pub async fn advance_result_set(&mut self) -> MdbResult<bool> {
        self.buffer.clear();
        self.pos.store(0, Ordering::Release);

        if !self.has_next_result_set().await? {
            return Ok(false);
        }
        let Some(mut chunk) = self.pending.take() else {
            return Ok(false);
        };

        self.schema = chunk.schema.take().unwrap_or_default();
        self.columns = self.schema.qualified_names().into();
        self.buffer = chunk.rows;
        self.last_chunk = chunk.done;
        self.progress.result_set.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            "Advanced to result set {} ({} columns)",
            self.progress.result_set(),
            self.columns.len()
        );
        Ok(true)
    }

    /// Release the cursor. Idempotent; frees the connection for the next
    /// query and tells the server to stop sending if the stream is unfinished.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.release();
    }

    fn exhausted(&self) -> bool {
        self.last_chunk || self.stream_ended
    }

    fn ensure_open(&self) -> MdbResult<()> {
        if self.closed {
            return Err(MdbError::bad_conn("rows are closed"));
        }
        if self.failed {
            return Err(MdbError::bad_conn("result stream failed"));
        }
        if self.guard.state().is_closed() {
            return Err(MdbError::bad_conn("connection is closed"));
        }
        Ok(())
    }

    async fn recv(&mut self) -> MdbResult<Option<QueryChunk>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(MdbError::bad_conn("result stream is gone"));
        };
        match with_deadline(self.read_timeout, "read", stream.recv()).await {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.stream_ended = true;
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn decode(&mut self, pos: usize) -> MdbResult<Row> {
        let raw = &self.buffer[pos];
        match decode_row(raw, &self.schema) {
            Ok(values) => Ok(Row {
                columns: self.columns.clone(),
                values,
            }),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Enter the terminal state after a stream or decode failure.
    fn fail(&mut self, err: MdbError) -> MdbError {
        tracing::warn!("Result stream failed: {}", err);
        self.failed = true;
        self.guard.state().mark_bad();
        self.release();
        err
    }

    fn release(&mut self) {
        self.buffer = Vec::new();
        self.pending = None;
        if let Some(mut stream) = self.stream.take() {
            if !self.exhausted() {
                stream.close_send();
            }
        }
        self.guard.release();
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.columns)
            .field("buffered", &self.buffer.len())
            .field("pos", &self.pos.load(Ordering::Relaxed))
            .field("closed", &self.closed)
            .finish()
    }
}

/// Decode a raw row against its schema; null bits win over column bytes.
pub fn decode_row(raw: &RawRow, schema: &Schema) -> Result<Vec<Value>, DecodeError> {
    if raw.columns.len() != schema.width() {
        return Err(DecodeError::RowWidth {
            expected: schema.width(),
            got: raw.columns.len(),
        });
    }
    raw.columns
        .iter()
        .zip(&schema.column_types)
        .enumerate()
        .map(|(i, (col, &datatype))| {
            // A short bitmap means the trailing columns are not null.
            if matches!(get_bit_in(&raw.null_bitmap, i), Ok(Bit::One)) {
                Ok(Value::Null)
            } else {
                decode_column(col, datatype)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap;
    use crate::protocol::Datatype;
    use bytes::Bytes;

    #[test]
    fn test_null_bit_wins_for_every_type() {
        let types = vec![
            Datatype::ByteArray,
            Datatype::String,
            Datatype::Int8,
            Datatype::Uint8,
            Datatype::Int16,
            Datatype::Uint16,
            Datatype::Int32,
            Datatype::Uint32,
            Datatype::Int64,
            Datatype::Uint64,
            Datatype::Float32,
            Datatype::Float64,
            Datatype::Bool,
            Datatype::Timestamp,
            Datatype::Uuid,
        ];
        let names = (0..types.len()).map(|i| format!("c{}", i)).collect();
        let schema = Schema::new(names, types.clone());
        // Garbage bytes that would fail to decode for every fixed-width type.
        let raw = RawRow {
            columns: vec![Bytes::from_static(&[0xff, 0xfe, 0xfd]); types.len()],
            null_bitmap: bitmap::from_fn(types.len(), |_| true),
        };
        let values = decode_row(&raw, &schema).unwrap();
        assert!(values.iter().all(Value::is_null));
    }

    #[test]
    fn test_short_bitmap_means_not_null() {
        let schema = Schema::new(vec!["a".into()], vec![Datatype::Int8]);
        let raw = RawRow {
            columns: vec![Bytes::from_static(&[7])],
            null_bitmap: Vec::new(),
        };
        assert_eq!(decode_row(&raw, &schema).unwrap(), vec![Value::Int(7)]);
    }

    #[test]
    fn test_row_width_mismatch() {
        let schema = Schema::new(vec!["a".into(), "b".into()], vec![Datatype::Int8; 2]);
        let raw = RawRow {
            columns: vec![Bytes::from_static(&[1])],
            null_bitmap: Vec::new(),
        };
        assert_eq!(
            decode_row(&raw, &schema),
            Err(DecodeError::RowWidth {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_row_accessors() {
        let row = Row {
            columns: vec!["user.id".to_string(), "user.name".to_string()].into(),
            values: vec![Value::Int(1), Value::Null],
        };
        assert_eq!(row.get::<i64>(0), Ok(1));
        assert_eq!(row.get_by_name::<Option<String>>("user.name"), Ok(None));
        assert_eq!(
            row.get::<i64>(5),
            Err(TypeError::NoSuchColumn("5".to_string()))
        );
        assert!(row.get_by_name::<i64>("id").is_err());
    }
}
