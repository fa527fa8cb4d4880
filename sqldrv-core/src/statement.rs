use crate::{Context, NamedValue, Result, Rows, RowsAffected, Value};
use std::future::Future;

/// A statement prepared on a connection, borrowed from it.
pub trait Statement: Send + Sync {
    type Rows: Rows;

    /// Number of placeholders, `None` when the driver cannot tell.
    fn num_input(&self) -> Option<usize>;

    /// Context-free variant of [`Statement::exec_context`]. Drivers may refuse it.
    fn exec(&self, args: &[Value]) -> impl Future<Output = Result<RowsAffected>> + Send;

    fn exec_context(
        &self,
        ctx: &Context,
        args: &[NamedValue],
    ) -> impl Future<Output = Result<RowsAffected>> + Send;

    /// Context-free variant of [`Statement::query_context`]. Drivers may refuse it.
    fn query(&self, args: &[Value]) -> impl Future<Output = Result<Self::Rows>> + Send;

    fn query_context(
        &self,
        ctx: &Context,
        args: &[NamedValue],
    ) -> impl Future<Output = Result<Self::Rows>> + Send;

    /// Release the server-side resources of the statement.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}
