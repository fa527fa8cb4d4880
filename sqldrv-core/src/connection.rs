use crate::{
    Context, NamedValue, Result, Rows, RowsAffected, Statement, Transaction, TxOptions,
};
use std::future::Future;

/// One backend connection, as handed out by a [`Connector`](crate::Connector).
///
/// A connection is used by one caller at a time, the implementation does not serialize concurrent
/// calls. Statements and transactions borrow the connection, they are issued through it.
///
/// Implementations report [`BadConnection`](crate::BadConnection) whenever the connection can no
/// longer be used, the caller is expected to drop it and retry on another one.
pub trait Connection: Send + Sync + Sized {
    type Statement<'c>: Statement<Rows = Self::Rows>
    where
        Self: 'c;
    type Transaction<'c>: Transaction
    where
        Self: 'c;
    type Rows: Rows;

    fn prepare(&self, query: &str) -> impl Future<Output = Result<Self::Statement<'_>>> + Send {
        async move {
            let ctx = Context::background();
            self.prepare_context(&ctx, query).await
        }
    }

    fn prepare_context(
        &self,
        ctx: &Context,
        query: &str,
    ) -> impl Future<Output = Result<Self::Statement<'_>>> + Send;

    /// Run a statement that returns no rows.
    fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> impl Future<Output = Result<RowsAffected>> + Send;

    /// Run a query returning rows.
    fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> impl Future<Output = Result<Self::Rows>> + Send;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction<'_>>> + Send {
        async move {
            let ctx = Context::background();
            self.begin_tx(&ctx, TxOptions::default()).await
        }
    }

    fn begin_tx(
        &self,
        ctx: &Context,
        options: TxOptions,
    ) -> impl Future<Output = Result<Self::Transaction<'_>>> + Send;

    /// Check the connection is alive.
    fn ping(&mut self, ctx: &Context) -> impl Future<Output = Result<()>> + Send;

    /// Called before the connection is reused by another caller.
    fn reset_session(&self, ctx: &Context) -> impl Future<Output = Result<()>> + Send;

    /// Validate or convert an argument before it is used. The default accepts everything.
    fn check_named_value(&self, _value: &mut NamedValue) -> Result<()> {
        Ok(())
    }

    /// Give the connection back.
    fn close(self) -> Result<()>;
}
