use crate::PostgresConnector;
use sqldrv_core::{Driver, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PostgresDriver {}

impl PostgresDriver {
    pub const fn new() -> Self {
        Self {}
    }
}

impl Driver for PostgresDriver {
    type Connector = PostgresConnector;

    const NAME: &'static str = "postgres";

    async fn open_connector(&self, name: &str) -> Result<PostgresConnector> {
        PostgresConnector::open(*self, name).await
    }
}
