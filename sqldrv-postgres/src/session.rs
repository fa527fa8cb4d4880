use crate::PoolConnection;
use sqldrv_core::{Context, Result, future::BoxFuture};
use std::borrow::Cow;

/// Hook run by [`Connection::reset_session`](sqldrv_core::Connection::reset_session) before a
/// connection is reused.
pub trait SessionReset<C>: Send + Sync {
    fn reset<'a>(&'a self, ctx: &'a Context, conn: &'a C) -> BoxFuture<'a, Result<()>>;
}

/// Leaves the session untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReset;

impl<C> SessionReset<C> for NoReset {
    fn reset<'a>(&'a self, _ctx: &'a Context, _conn: &'a C) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Runs a fixed SQL text, for example `RESET ALL`.
#[derive(Debug, Clone)]
pub struct ResetSql(pub Cow<'static, str>);

impl ResetSql {
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self(sql.into())
    }
}

impl<C: PoolConnection> SessionReset<C> for ResetSql {
    fn reset<'a>(&'a self, _ctx: &'a Context, conn: &'a C) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            conn.exec(&self.0, &[]).await?;
            Ok(())
        })
    }
}
