//! Deadline and cancellation scope for a single backend call.
//!
//! A [`QueryCtx`] is derived per inbound request from the request's
//! cancellation token. Every repository call runs its sqlx future through
//! [`QueryCtx::run`], which drops the future (aborting the in-flight query on
//! the client side) as soon as the deadline passes or the token is cancelled.
//! Dropping the context cancels its token, so anything still bound to it is
//! released when the owning handler returns.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{DbError, Result};

pub struct QueryCtx {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
    _release: DropGuard,
}

impl QueryCtx {
    /// Detached context with its own root token.
    pub fn new(timeout: Duration) -> Self {
        Self::child_of(&CancellationToken::new(), timeout)
    }

    /// Context bound to `parent`: cancelling the parent cancels this context.
    pub fn child_of(parent: &CancellationToken, timeout: Duration) -> Self {
        let token = parent.child_token();
        Self {
            _release: token.clone().drop_guard(),
            token,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time left before the deadline (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run a sqlx future under this context.
    ///
    /// Cancellation wins over the deadline, the deadline wins over a future that
    /// becomes ready in the same poll.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DbError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => {
                tracing::debug!(timeout = ?self.timeout, "query deadline exceeded");
                Err(DbError::DeadlineExceeded(self.timeout))
            }
            res = fut => res.map_err(DbError::from),
        }
    }
}

impl std::fmt::Debug for QueryCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCtx")
            .field("timeout", &self.timeout)
            .field("remaining", &self.remaining())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
