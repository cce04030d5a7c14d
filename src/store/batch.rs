use crate::store::value::SqlValue;

/// One parameterized statement plus the parameter tuples it is executed with.
///
/// Rows are append-only: a producer grows the batch while it discovers data and
/// the gateway applies them in the order they were pushed. Tuple arity is not
/// checked here; a mismatch surfaces as a row-level failure at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWrite {
    statement: String,
    rows: Vec<Vec<SqlValue>>,
}

impl BatchWrite {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            rows: Vec::new(),
        }
    }

    pub fn push<I>(&mut self, row: I)
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Appends an already-built tuple
    pub fn push_row(&mut self, row: Vec<SqlValue>) {
        self.rows.push(row);
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Builds a parameter tuple out of heterogeneous values.
///
/// ```ignore
/// batch.push_row(row![movie.title, movie.year, movie.rating]);
/// ```
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::store::SqlValue::from($value)),*]
    };
}
