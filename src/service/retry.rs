use crate::error::AdminError;
use backon::{ConstantBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry for operator actions that may hit a transient failure.
///
/// Only errors for which [`AdminError::is_retryable`] holds are retried.
/// Partial effects of a failed attempt are not rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }

    pub async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, AdminError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdminError>>,
    {
        f.retry(self.backoff())
            .when(|e: &AdminError| e.is_retryable())
            .notify(|err, dur: Duration| {
                warn!(op, error = %err, "retrying after {:?}", dur);
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn transient_failures_are_retried_up_to_the_limit() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        let result = policy
            .run("flaky", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AdminError::Timeout(Duration::from_secs(1)))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);

        calls.store(0, Ordering::SeqCst);
        let result: Result<(), _> = policy
            .run("always", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AdminError::Timeout(Duration::from_secs(1)))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn caller_mistakes_fail_on_the_first_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = policy
            .run("invalid", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AdminError::Validation("bad".into()))
            })
            .await;
        assert!(matches!(result, Err(AdminError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
