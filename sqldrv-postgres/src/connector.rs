use crate::{
    NoReset, PgPool, Pool, PostgresConnection, PostgresDriver, ResultFormats, SessionReset,
};
use sqldrv_core::{Connector, Context, Result};
use std::sync::Arc;

/// Hands out [`PostgresConnection`]s backed by a shared pool.
pub struct PostgresConnector<P: Pool = PgPool> {
    driver: PostgresDriver,
    pool: P,
    formats: Arc<ResultFormats>,
    reset: Arc<dyn SessionReset<P::Connection>>,
}

impl PostgresConnector<PgPool> {
    /// Connector over a new pool for the connection string `dsn`.
    pub async fn open(driver: PostgresDriver, dsn: &str) -> Result<Self> {
        Ok(Self::new(driver, PgPool::connect(dsn).await?))
    }
}

impl<P: Pool> PostgresConnector<P> {
    pub fn new(driver: PostgresDriver, pool: P) -> Self {
        Self {
            driver,
            pool,
            formats: ResultFormats::intrinsic(),
            reset: Arc::new(NoReset),
        }
    }

    pub fn with_result_formats(mut self, formats: Arc<ResultFormats>) -> Self {
        self.formats = formats;
        self
    }

    /// Hook run by [`Connection::reset_session`](sqldrv_core::Connection::reset_session) on
    /// every connection of this connector.
    pub fn with_session_reset(mut self, reset: Arc<dyn SessionReset<P::Connection>>) -> Self {
        self.reset = reset;
        self
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }
}

impl<P: Pool> Connector for PostgresConnector<P> {
    type Driver = PostgresDriver;
    type Connection = PostgresConnection<P::Connection>;

    async fn connect(&self, ctx: &Context) -> Result<PostgresConnection<P::Connection>> {
        let raw = ctx.run(self.pool.acquire()).await?;
        Ok(PostgresConnection::new(raw, self.formats.clone())
            .with_session_reset(self.reset.clone()))
    }

    fn driver(&self) -> &PostgresDriver {
        &self.driver
    }
}
