use std::future::Future;
use std::time::Duration;

use crate::{config::Config, error::AppError};

/// Timeout and retry rules applied to every store call.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// Extra attempts after a transient failure. Only used by [`CallPolicy::run`].
    pub retries: u32,
}

impl CallPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.store_timeout,
            retries: config.store_retries,
        }
    }

    /// Runs an idempotent call, retrying immediately while it fails with `Unavailable`.
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 0;
        loop {
            match self.once(op, call()).await {
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(op, attempt, "Store call failed, retrying: {}", err);
                }
                result => return result,
            }
        }
    }

    /// Runs a single attempt under the timeout. Used for writes that must not be repeated.
    pub async fn once<T, Fut>(&self, op: &'static str, fut: Fut) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Store call timed out");
                Err(AppError::Unavailable(format!(
                    "{} timed out after {:?}",
                    op, self.timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(retries: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(50),
            retries,
        }
    }

    #[tokio::test]
    async fn slow_call_becomes_unavailable() {
        let result: Result<(), _> = policy(0)
            .once("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy(1)
            .run("flaky", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AppError::Unavailable("down".into()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_are_bounded_and_skip_other_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = policy(1)
            .run("down", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Unavailable("down".into()))
            })
            .await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = policy(3)
            .run("forbidden", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Forbidden("no".into()))
            })
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
