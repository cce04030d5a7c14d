//! Forward-only row sequences returned by [`StorageGateway::query`].
//!
//! [`StorageGateway::query`]: crate::store::StorageGateway::query

use crate::error::Result;
use crate::store::value::SqlValue;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::warn;

/// A single result row: column names shared across the result set, plus values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value by position
    pub fn get(&self, idx: usize) -> Option<&SqlValue> {
        self.values.get(idx)
    }

    /// Value by column name
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn text(&self, column: &str) -> Option<String> {
        self.value(column).and_then(SqlValue::as_str).map(str::to_string)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.value(column).and_then(SqlValue::as_i64)
    }

    pub fn float(&self, column: &str) -> Option<f64> {
        self.value(column).and_then(SqlValue::as_f64)
    }

    pub fn boolean(&self, column: &str) -> Option<bool> {
        self.value(column).and_then(SqlValue::as_bool)
    }
}

/// Finite, single-pass sequence of rows.
///
/// Exhausting the sequence or calling [`Rows::close`] releases the underlying
/// connection. A failure while streaming is logged and ends the sequence.
pub struct Rows {
    inner: Option<BoxStream<'static, Result<Row>>>,
}

impl Rows {
    pub fn new(stream: BoxStream<'static, Result<Row>>) -> Self {
        Self {
            inner: Some(stream),
        }
    }

    /// A sequence that yields nothing, returned when the query itself failed
    pub fn empty() -> Self {
        Self { inner: None }
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::new(stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    pub async fn next(&mut self) -> Option<Row> {
        let stream = self.inner.as_mut()?;

        match stream.next().await {
            Some(Ok(row)) => Some(row),
            Some(Err(e)) => {
                warn!("Failed to read row, closing stream: {}", e);
                self.close();
                None
            }
            None => {
                self.close();
                None
            }
        }
    }

    pub fn close(&mut self) {
        self.inner = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Drains the remaining rows
    pub async fn collect(mut self) -> Vec<Row> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row);
        }
        rows
    }
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("closed", &self.is_closed())
            .finish()
    }
}
