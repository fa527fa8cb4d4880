use crate::ResultFormats;
use sqldrv_core::{Error, Result, Row, RowNames, Value, stream::BoxStream};
use std::{
    fmt::{self, Debug},
    future::Future,
    sync::Arc,
};

/// Server-side identity of a prepared statement and its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDescription {
    pub name: String,
    pub sql: String,
    /// Type OID of each parameter.
    pub param_oids: Vec<u32>,
    pub columns: RowNames,
}

/// Rows of a query as produced by the backend, already decoded.
pub struct ResultStream {
    pub columns: RowNames,
    pub rows: BoxStream<'static, Result<Row>>,
}

impl Debug for ResultStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStream")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxIsoLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
}

impl TxIsoLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TxIsoLevel::Serializable => "serializable",
            TxIsoLevel::RepeatableRead => "repeatable read",
            TxIsoLevel::ReadCommitted => "read committed",
            TxIsoLevel::ReadUncommitted => "read uncommitted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxAccessMode {
    ReadWrite,
    ReadOnly,
}

impl TxAccessMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TxAccessMode::ReadWrite => "read write",
            TxAccessMode::ReadOnly => "read only",
        }
    }
}

/// Transaction options in the backend's own terms, `None` leaves the server default.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackendTxOptions {
    pub iso_level: Option<TxIsoLevel>,
    pub access_mode: Option<TxAccessMode>,
}

impl BackendTxOptions {
    pub fn begin_sql(&self) -> String {
        let mut sql = String::from("begin");
        if let Some(iso_level) = self.iso_level {
            sql.push_str(" isolation level ");
            sql.push_str(iso_level.as_sql());
        }
        if let Some(access_mode) = self.access_mode {
            sql.push(' ');
            sql.push_str(access_mode.as_sql());
        }
        sql
    }
}

/// Source of pooled backend connections.
///
/// Dropping the acquired connection gives it back to the pool.
pub trait Pool: Send + Sync + 'static {
    type Connection: PoolConnection;

    fn acquire(&self) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// Protocol-level operations of one pooled connection.
pub trait PoolConnection: Send + Sync + 'static {
    type Transaction<'c>: BackendTransaction
    where
        Self: 'c;

    /// Whether the underlying connection is known to be gone. Must not perform any I/O.
    fn is_closed(&self) -> bool;

    /// Prepare `sql` and make it addressable as `name` by [`PoolConnection::exec`] and
    /// [`PoolConnection::query`].
    fn prepare(
        &self,
        name: &str,
        sql: &str,
    ) -> impl Future<Output = Result<StatementDescription>> + Send;

    /// Run `sql`, either SQL text or the name of a prepared statement, returning the number of
    /// rows affected.
    fn exec(&self, sql: &str, args: &[Value]) -> impl Future<Output = Result<u64>> + Send;

    /// Run `sql`, either SQL text or the name of a prepared statement. Columns are decoded
    /// according to `formats`.
    fn query(
        &self,
        sql: &str,
        formats: &Arc<ResultFormats>,
        args: &[Value],
    ) -> impl Future<Output = Result<ResultStream>> + Send;

    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    fn begin(
        &self,
        options: &BackendTxOptions,
    ) -> impl Future<Output = Result<Self::Transaction<'_>>> + Send;

    /// Forget the prepared statement `name` and release it on the server.
    fn deallocate(&self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Whether `error` guarantees nothing reached the server, so the operation may be retried on
    /// another connection.
    fn safe_to_retry(error: &Error) -> bool;
}

pub trait BackendTransaction: Send {
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
