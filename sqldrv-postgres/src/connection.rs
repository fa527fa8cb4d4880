use crate::{
    BackendTxOptions, NoReset, PgClient, PoolConnection, PostgresRows, PostgresStatement,
    PostgresTransaction, ResultFormats, SessionReset, TxAccessMode, TxIsoLevel,
};
use sqldrv_core::{
    BadConnection, Connection, Context, Error, IsolationLevel, NamedValue, Result, RowsAffected,
    TxOptions, UnsupportedIsolation, Value, truncate_long,
};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Prefix of the server-side names given to prepared statements.
pub const STATEMENT_NAME_PREFIX: &str = "pgx";

/// Driver connection wrapping one pooled backend connection.
///
/// Once the pooled connection is released, by [`Connection::close`] or by a failed ping, every
/// operation fails with [`BadConnection`].
pub struct PostgresConnection<C: PoolConnection = PgClient> {
    raw: Option<C>,
    formats: Arc<ResultFormats>,
    statement_count: AtomicU64,
    reset: Arc<dyn SessionReset<C>>,
}

impl<C: PoolConnection> PostgresConnection<C> {
    pub fn new(raw: C, formats: Arc<ResultFormats>) -> Self {
        Self {
            raw: Some(raw),
            formats,
            statement_count: AtomicU64::new(0),
            reset: Arc::new(NoReset),
        }
    }

    pub fn with_session_reset(mut self, reset: Arc<dyn SessionReset<C>>) -> Self {
        self.set_session_reset(reset);
        self
    }

    pub fn set_session_reset(&mut self, reset: Arc<dyn SessionReset<C>>) {
        self.reset = reset;
    }

    /// The pooled backend connection, `None` after it was released.
    pub fn raw_conn(&self) -> Option<&C> {
        self.raw.as_ref()
    }

    pub fn result_formats(&self) -> &Arc<ResultFormats> {
        &self.formats
    }

    pub fn is_closed(&self) -> bool {
        self.raw.as_ref().is_none_or(C::is_closed)
    }

    fn live(&self) -> Result<&C> {
        match &self.raw {
            Some(raw) if !raw.is_closed() => Ok(raw),
            _ => Err(BadConnection.into()),
        }
    }

    fn next_statement_name(&self) -> String {
        let n = self.statement_count.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", STATEMENT_NAME_PREFIX, n)
    }

    fn release(&mut self) {
        if self.raw.take().is_some() {
            log::debug!("Released the pooled connection");
        }
    }

    /// Converts a failed exec or query: an error that guarantees nothing was sent to the server
    /// turns into [`BadConnection`], anything else is returned as it is.
    fn failure(&self, error: Error, action: &str, query: &str) -> Error {
        if C::safe_to_retry(&error) {
            log::debug!(
                "Connection lost before {} the query, reporting it as bad: {:#}",
                action,
                error
            );
            return BadConnection.into();
        }
        log::error!(
            "While {} the query:\n{}\n{:#}",
            action,
            truncate_long!(query),
            error
        );
        error
    }

    /// Begin a transaction, or hand out the pooled connection instead.
    ///
    /// When `raw` is given, the pooled connection is written into it and a transaction that does
    /// nothing on commit or rollback is returned, no transaction is started on the server.
    pub async fn begin_tx_with<'c>(
        &'c self,
        ctx: &Context,
        options: TxOptions,
        raw: Option<&mut Option<&'c C>>,
    ) -> Result<PostgresTransaction<'c, C>> {
        let conn = self.live()?;
        if let Some(slot) = raw {
            *slot = Some(conn);
            return Ok(PostgresTransaction::NoOp);
        }
        let options = tx_options(&options)?;
        let tx = ctx.run(conn.begin(&options)).await.map_err(|e| {
            log::error!("While running `{}`: {:#}", options.begin_sql(), e);
            e
        })?;
        Ok(PostgresTransaction::Wrapped {
            ctx: ctx.clone(),
            tx,
        })
    }
}

/// Arguments in placeholder order, names are ignored.
fn positional(args: &[NamedValue]) -> Vec<Value> {
    let mut args = args.iter().collect::<Vec<_>>();
    args.sort_by_key(|v| v.ordinal);
    args.into_iter().map(|v| v.value.clone()).collect()
}

/// Translate generic transaction options into the backend ones.
pub fn tx_options(options: &TxOptions) -> Result<BackendTxOptions> {
    let iso_level = match options.isolation {
        IsolationLevel::Default => None,
        IsolationLevel::ReadUncommitted => Some(TxIsoLevel::ReadUncommitted),
        IsolationLevel::ReadCommitted => Some(TxIsoLevel::ReadCommitted),
        IsolationLevel::RepeatableRead | IsolationLevel::Snapshot => {
            Some(TxIsoLevel::RepeatableRead)
        }
        IsolationLevel::Serializable => Some(TxIsoLevel::Serializable),
        level => return Err(UnsupportedIsolation(level).into()),
    };
    Ok(BackendTxOptions {
        iso_level,
        access_mode: options.read_only.then_some(TxAccessMode::ReadOnly),
    })
}

impl<C: PoolConnection> Connection for PostgresConnection<C> {
    type Statement<'c>
        = PostgresStatement<'c, C>
    where
        Self: 'c;
    type Transaction<'c>
        = PostgresTransaction<'c, C>
    where
        Self: 'c;
    type Rows = PostgresRows;

    async fn prepare_context(
        &self,
        ctx: &Context,
        query: &str,
    ) -> Result<PostgresStatement<'_, C>> {
        let conn = self.live()?;
        let name = self.next_statement_name();
        let description = ctx.run(conn.prepare(&name, query)).await.map_err(|e| {
            log::error!(
                "While preparing the query:\n{}\n{:#}",
                truncate_long!(query),
                e
            );
            e
        })?;
        Ok(PostgresStatement::new(self, description))
    }

    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<RowsAffected> {
        let conn = self.live()?;
        let args = positional(args);
        ctx.run(conn.exec(query, &args))
            .await
            .map(RowsAffected::new)
            .map_err(|e| self.failure(e, "executing", query))
    }

    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<PostgresRows> {
        let conn = self.live()?;
        let args = positional(args);
        let stream = ctx
            .run(conn.query(query, &self.formats, &args))
            .await
            .map_err(|e| self.failure(e, "querying", query))?;
        let mut rows = PostgresRows::new(ctx.clone(), stream);
        if let Err(e) = rows.preload().await {
            log::error!(
                "While reading the first row of the query:\n{}\n{:#}",
                truncate_long!(query),
                e
            );
            rows.discard();
            return Err(e);
        }
        Ok(rows)
    }

    async fn begin_tx(
        &self,
        ctx: &Context,
        options: TxOptions,
    ) -> Result<PostgresTransaction<'_, C>> {
        self.begin_tx_with(ctx, options, None).await
    }

    async fn ping(&mut self, ctx: &Context) -> Result<()> {
        let conn = self.live()?;
        let result = ctx.run(conn.ping()).await;
        if let Err(e) = result {
            log::warn!("Ping failed, releasing the connection: {:#}", e);
            self.release();
            return Err(BadConnection.into());
        }
        Ok(())
    }

    async fn reset_session(&self, ctx: &Context) -> Result<()> {
        let conn = self.live()?;
        ctx.run(self.reset.reset(ctx, conn)).await
    }

    fn close(mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}
