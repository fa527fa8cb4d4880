use crate::{Result, Value};
use std::{future::Future, sync::Arc};

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Backend-specific last inserted / affected identifier when available.
    pub last_affected_id: Option<i64>,
}

impl RowsAffected {
    pub const fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            last_affected_id: None,
        }
    }
}

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// Cursor over the rows produced by a query.
///
/// The column names must be available as soon as the cursor is returned, before the first call to
/// [`Rows::next`].
pub trait Rows: Send {
    fn columns(&self) -> &[String];

    /// Advance the cursor, `None` once the result is exhausted.
    fn next(&mut self) -> impl Future<Output = Result<Option<Row>>> + Send;

    /// Stop reading. Rows not consumed yet are discarded.
    fn close(self) -> Result<()>;
}
