use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::Result;

/// How a session loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The loop ran out of work on its own (stream closed, queue dropped).
    Finished,
    /// The loop stopped because the shared token was cancelled.
    Cancelled,
    Failed(String),
}

impl LoopOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, LoopOutcome::Failed(_))
    }
}

impl fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopOutcome::Finished => f.write_str("finished"),
            LoopOutcome::Cancelled => f.write_str("cancelled"),
            LoopOutcome::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

struct SessionLoop {
    name: &'static str,
    handle: JoinHandle<LoopOutcome>,
}

/// A set of sibling loops sharing one cancellation token.
///
/// Whichever loop ends first, for any reason, cancels the token so the
/// others wind down too.
pub struct LoopPool {
    token: CancellationToken,
    loops: Vec<SessionLoop>,
}

impl Default for LoopPool {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopPool {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            loops: Vec::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Spawn `f` on the runtime, handing it a clone of the shared token.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.token.clone();
        let fut = f(token.clone());
        let handle = tokio::spawn(async move {
            let result = fut.await;
            let outcome = match result {
                Ok(()) if token.is_cancelled() => LoopOutcome::Cancelled,
                Ok(()) => LoopOutcome::Finished,
                Err(e) => {
                    error!(name, "session loop failed: {e}");
                    LoopOutcome::Failed(e.to_string())
                }
            };
            debug!(name, %outcome, "session loop ended");
            token.cancel();
            outcome
        });
        self.loops.push(SessionLoop { name, handle });
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for every loop, in spawn order.
    pub async fn join_all(self) -> Vec<(&'static str, LoopOutcome)> {
        let mut outcomes = Vec::with_capacity(self.loops.len());
        for SessionLoop { name, handle } in self.loops {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(name, "session loop panicked or was aborted: {e}");
                    LoopOutcome::Failed(e.to_string())
                }
            };
            outcomes.push((name, outcome));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DroidlinkError;

    #[tokio::test]
    async fn failure_cancels_siblings() {
        let mut pool = LoopPool::new();
        pool.spawn("waiter", |token| async move {
            token.cancelled().await;
            Ok(())
        });
        pool.spawn("broken", |_| async { Err(DroidlinkError::ProtocolViolation("boom")) });

        let outcomes = pool.join_all().await;
        assert_eq!(outcomes[0], ("waiter", LoopOutcome::Cancelled));
        assert_eq!(outcomes[1].0, "broken");
        assert!(outcomes[1].1.is_failure());
    }

    #[tokio::test]
    async fn clean_finish_also_cancels() {
        let mut pool = LoopPool::new();
        let token = pool.token();
        pool.spawn("short", |_| async { Ok(()) });
        token.cancelled().await;
        assert_eq!(pool.join_all().await, [("short", LoopOutcome::Finished)]);
    }

    #[tokio::test]
    async fn external_cancel_reports_cancelled() {
        let mut pool = LoopPool::new();
        pool.spawn("idle", |token| async move {
            token.cancelled().await;
            Ok(())
        });
        pool.cancel();
        assert_eq!(pool.join_all().await, [("idle", LoopOutcome::Cancelled)]);
    }
}
