use crate::{Connection, Context, Driver, Result};
use std::future::Future;

/// Produces connections to one data source.
pub trait Connector: Send + Sync {
    type Driver: Driver;
    type Connection: Connection;

    /// Obtain a connection, waiting at most as long as `ctx` allows.
    fn connect(&self, ctx: &Context) -> impl Future<Output = Result<Self::Connection>> + Send;

    fn driver(&self) -> &Self::Driver;
}
