use crate::{PgClient, PoolConnection, PostgresConnection, PostgresRows, StatementDescription};
use sqldrv_core::{
    BadConnection, Connection, Context, NamedValue, NotImplemented, Result, RowsAffected,
    Statement, Value,
};
use std::time::Duration;

/// Upper bound of [`Statement::close`].
pub const DEALLOCATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Statement prepared on a [`PostgresConnection`] under a generated server-side name.
pub struct PostgresStatement<'c, C: PoolConnection = PgClient> {
    conn: &'c PostgresConnection<C>,
    description: StatementDescription,
}

impl<'c, C: PoolConnection> PostgresStatement<'c, C> {
    pub(crate) fn new(conn: &'c PostgresConnection<C>, description: StatementDescription) -> Self {
        Self { conn, description }
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn description(&self) -> &StatementDescription {
        &self.description
    }
}

impl<C: PoolConnection> Statement for PostgresStatement<'_, C> {
    type Rows = PostgresRows;

    fn num_input(&self) -> Option<usize> {
        Some(self.description.param_oids.len())
    }

    async fn exec(&self, _args: &[Value]) -> Result<RowsAffected> {
        Err(NotImplemented("Statement::exec").into())
    }

    async fn exec_context(&self, ctx: &Context, args: &[NamedValue]) -> Result<RowsAffected> {
        self.conn.exec_context(ctx, self.name(), args).await
    }

    async fn query(&self, _args: &[Value]) -> Result<PostgresRows> {
        Err(NotImplemented("Statement::query").into())
    }

    async fn query_context(&self, ctx: &Context, args: &[NamedValue]) -> Result<PostgresRows> {
        self.conn.query_context(ctx, self.name(), args).await
    }

    async fn close(self) -> Result<()> {
        let conn = self.conn.raw_conn().ok_or(BadConnection)?;
        let ctx = Context::background().with_timeout(DEALLOCATE_TIMEOUT);
        ctx.run(conn.deallocate(self.name())).await
    }
}
