use refinevoice_core::FailureKind;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("timed out after {deadline_ms}ms")]
    TimedOut { deadline_ms: u64 },

    #[error("cancelled by caller")]
    Cancelled,

    #[error("provider error: {0:#}")]
    Provider(anyhow::Error),
}

impl GuardError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            GuardError::TimedOut { .. } | GuardError::Cancelled => FailureKind::Timeout,
            GuardError::Provider(_) => FailureKind::ProviderError,
        }
    }
}

/// Bounds one remote call with a deadline.
///
/// The call receives a child of the guard's token; the token is cancelled when
/// the deadline passes (or the parent is cancelled) and the call's future is
/// dropped at its next suspension point.
#[derive(Debug, Clone, Default)]
pub struct StageTimeoutGuard {
    parent: CancellationToken,
}

impl StageTimeoutGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: CancellationToken) -> Self {
        Self { parent }
    }

    pub async fn guard<F, Fut, T>(&self, deadline: Duration, call: F) -> Result<T, GuardError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if self.parent.is_cancelled() {
            return Err(GuardError::Cancelled);
        }

        let token = self.parent.child_token();
        let fut = call(token.clone());

        tokio::select! {
            biased;
            res = fut => res.map_err(GuardError::Provider),
            _ = tokio::time::sleep(deadline) => {
                token.cancel();
                Err(GuardError::TimedOut {
                    deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                })
            }
            _ = self.parent.cancelled() => {
                token.cancel();
                Err(GuardError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn passes_through_fast_results() {
        let guard = StageTimeoutGuard::new();
        let out = guard
            .guard(Duration::from_secs(1), |_| async { Ok::<_, anyhow::Error>(7) })
            .await
            .unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn provider_errors_are_distinct_from_timeouts() {
        let guard = StageTimeoutGuard::new();
        let err = guard
            .guard(Duration::from_secs(1), |_| async {
                Err::<(), _>(anyhow::anyhow!("401 unauthorized"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Provider(_)));
        assert_eq!(err.failure_kind(), FailureKind::ProviderError);
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_cancels_the_call_token() {
        let guard = StageTimeoutGuard::new();
        let seen = Arc::new(std::sync::Mutex::new(None::<CancellationToken>));
        let seen2 = seen.clone();

        let err = guard
            .guard(Duration::from_millis(50), move |token| {
                *seen2.lock().unwrap() = Some(token);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, anyhow::Error>(())
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GuardError::TimedOut { deadline_ms: 50 }));
        assert_eq!(err.failure_kind(), FailureKind::Timeout);
        assert!(seen.lock().unwrap().as_ref().unwrap().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_one_guard_leaves_another_alone() {
        let parent_a = CancellationToken::new();
        let a = StageTimeoutGuard::with_parent(parent_a.clone());
        let b = StageTimeoutGuard::new();
        parent_a.cancel();

        let finished = Arc::new(AtomicBool::new(false));
        let finished2 = finished.clone();

        let a_res = a
            .guard(Duration::from_secs(1), |_| async { Ok::<_, anyhow::Error>(()) })
            .await;
        let b_res = b
            .guard(Duration::from_secs(1), move |_| async move {
                finished2.store(true, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
            .await;

        assert!(matches!(a_res, Err(GuardError::Cancelled)));
        assert!(b_res.is_ok());
        assert!(finished.load(Ordering::SeqCst));
    }
}
