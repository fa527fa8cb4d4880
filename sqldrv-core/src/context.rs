use crate::Result;
use std::{
    fmt::{self, Display},
    future::{self, Future},
    time::Duration,
};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation scope of a driver call.
///
/// Every operation that may wait on the network receives a `Context` and gives up as soon as the
/// context is canceled or its deadline passes, reporting a [`ContextError`].
///
/// Contexts form a tree: a derived context never outlives the deadline of its parent and is
/// canceled together with it.
///
/// ```rust,ignore
/// let (ctx, cancel) = Context::background().with_timeout(Duration::from_secs(3)).with_cancel();
/// let rows = connection.query_context(&ctx, "SELECT 1", &[]).await?;
/// cancel.cancel();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Context {
    /// Root context: no deadline and never canceled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context expiring at `deadline`, or earlier if the parent already does.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(self.deadline.map_or(deadline, |current| current.min(deadline))),
            cancel: self.cancel.clone(),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a cancelable context. Canceling the returned token affects the derived context only,
    /// canceling the parent affects both.
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        (
            Self {
                deadline: self.deadline,
                cancel: Some(token.clone()),
            },
            token,
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(ContextError::Canceled);
        }
        if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Some(ContextError::DeadlineExceeded);
        }
        None
    }

    /// Drive `operation` to completion unless the context ends first.
    ///
    /// The operation is not polled at all when the context is already done. When cancellation or
    /// the deadline wins the race the operation is dropped and the corresponding [`ContextError`] is
    /// returned.
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(error) = self.err() {
            return Err(error.into());
        }
        let canceled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = canceled => Err(ContextError::Canceled.into()),
            _ = expired => Err(ContextError::DeadlineExceeded.into()),
            result = operation => result,
        }
    }
}

/// Reason a [`Context`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Canceled,
    DeadlineExceeded,
}

impl Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Canceled => f.write_str("context canceled"),
            ContextError::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

impl std::error::Error for ContextError {}
