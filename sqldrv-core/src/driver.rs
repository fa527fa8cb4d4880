use crate::{Connector, Context, Result};
use std::{future::Future, time::Duration};

/// Upper bound of [`Driver::open`].
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Entry point of a backend.
pub trait Driver: Send + Sync + Sized {
    type Connector: Connector<Driver = Self>;

    /// Name of the backend, also the scheme of its data source URLs.
    const NAME: &'static str;

    /// Create a connector for the data source `name`, which is handed verbatim to the backend.
    fn open_connector(&self, name: &str) -> impl Future<Output = Result<Self::Connector>> + Send;

    /// Open a single connection to `name`, giving up after [`OPEN_TIMEOUT`].
    fn open(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<<Self::Connector as Connector>::Connection>> + Send {
        async move {
            let ctx = Context::background().with_timeout(OPEN_TIMEOUT);
            let connector = ctx.run(self.open_connector(name)).await?;
            connector.connect(&ctx).await
        }
    }
}
