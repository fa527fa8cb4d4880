use crate::Result;
use std::future::Future;

/// A transaction started by [`Connection::begin_tx`](crate::Connection::begin_tx).
///
/// Statements of the transaction keep going through the connection, the transaction itself only
/// decides how it ends.
pub trait Transaction: Send {
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
