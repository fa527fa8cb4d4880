use crate::{BackendTransaction, PgClient, PoolConnection};
use sqldrv_core::{Context, Result, Transaction};

pub enum PostgresTransaction<'c, C: PoolConnection + 'c = PgClient> {
    /// Backend transaction, ended under the context it was started with.
    Wrapped {
        ctx: Context,
        tx: C::Transaction<'c>,
    },
    /// Returned when the caller took the pooled connection instead of starting a transaction.
    NoOp,
}

impl<C: PoolConnection> Transaction for PostgresTransaction<'_, C> {
    async fn commit(self) -> Result<()> {
        match self {
            PostgresTransaction::Wrapped { ctx, tx } => ctx.run(tx.commit()).await,
            PostgresTransaction::NoOp => Ok(()),
        }
    }

    async fn rollback(self) -> Result<()> {
        match self {
            PostgresTransaction::Wrapped { ctx, tx } => ctx.run(tx.rollback()).await,
            PostgresTransaction::NoOp => Ok(()),
        }
    }
}
