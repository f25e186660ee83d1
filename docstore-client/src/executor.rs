//! Throttle-aware execution of single store attempts.
//!
//! The executor repeats an operation while the store reports "too many
//! requests", waiting between attempts with a linearly growing delay.
//! Missing items and other failures are mapped to [`DocstoreError`]s.

use http::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{StoreResponse, StoreResult};
use crate::cancel::CancelSignal;
use crate::error::{DocstoreError, Result};

/// Backoff configuration for throttled requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay used when the store gives no hint
    pub default_retry_delay: Duration,
    /// Growth per retry: `delay * (1 + backoff_factor * retries)`
    pub backoff_factor: f64,
    /// Retries allowed before giving up; `None` retries forever
    pub max_retries: Option<u32>,
    /// Total time allowed for one operation including waits
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            default_retry_delay: Duration::from_millis(5000),
            backoff_factor: 0.2,
            max_retries: Some(20),
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// Wait before the retry that follows `retry_count` earlier retries.
    ///
    /// Negative or NaN backoff factors count as zero, so delays never shrink.
    pub fn delay_for(&self, retry_count: u32, server_hint: Option<Duration>) -> Duration {
        let base = server_hint.unwrap_or(self.default_retry_delay);
        let scale = 1.0 + self.backoff_factor.max(0.0) * f64::from(retry_count);
        Duration::from_nanos((base.as_nanos() as f64 * scale).round() as u64)
    }
}

/// What happened while executing one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryStats {
    /// Throttled attempts that were retried
    pub retries: u32,
    /// Wait before each retry, in order
    pub delays: Vec<Duration>,
}

enum Outcome {
    Success(StoreResponse),
    Throttled {
        status: StatusCode,
        retry_after: Option<Duration>,
    },
    NotFound(String),
    Unexpected {
        status: StatusCode,
        message: String,
    },
}

fn classify(result: StoreResult) -> Outcome {
    let (status, retry_after, message, response) = match result {
        Ok(response) => (response.status, response.retry_after, None, Some(response)),
        Err(e) => (e.status, e.retry_after, Some(e.message), None),
    };

    match (status, response) {
        (StatusCode::TOO_MANY_REQUESTS, _) => Outcome::Throttled {
            status,
            retry_after,
        },
        (StatusCode::NOT_FOUND, _) => {
            Outcome::NotFound(message.unwrap_or_else(|| "Resource not found".to_string()))
        }
        (status, Some(response)) if status.is_success() => Outcome::Success(response),
        (status, _) => Outcome::Unexpected {
            status,
            message: message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unexpected response")
                    .to_string()
            }),
        },
    }
}

/// Runs store operations with throttling retries.
#[derive(Debug, Clone, Default)]
pub struct RequestExecutor {
    policy: RetryPolicy,
    cancel: Option<CancelSignal>,
}

impl RequestExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    /// Abort attempts and backoff waits when `signal` fires.
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation` until it stops being throttled.
    ///
    /// Returns `Ok(None)` for a missing item when `throw_if_not_found` is
    /// false.
    pub async fn execute<F, Fut>(
        &self,
        operation: F,
        throw_if_not_found: bool,
    ) -> Result<Option<StoreResponse>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult>,
    {
        self.execute_with_stats(operation, throw_if_not_found)
            .await
            .map(|(response, _)| response)
    }

    /// Like [`execute`], also reporting the retries that were made.
    ///
    /// [`execute`]: RequestExecutor::execute
    pub async fn execute_with_stats<F, Fut>(
        &self,
        mut operation: F,
        throw_if_not_found: bool,
    ) -> Result<(Option<StoreResponse>, RetryStats)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult>,
    {
        let started = Instant::now();
        let mut stats = RetryStats::default();

        loop {
            self.ensure_not_cancelled()?;

            let result = match &self.cancel {
                Some(signal) => tokio::select! {
                    biased;
                    _ = signal.cancelled() => return Err(DocstoreError::Cancelled),
                    result = operation() => result,
                },
                None => operation().await,
            };

            match classify(result) {
                Outcome::Success(response) => {
                    debug!(
                        status = %response.status,
                        retries = stats.retries,
                        charge = response.request_charge,
                        "Request succeeded"
                    );
                    return Ok((Some(response), stats));
                }
                Outcome::NotFound(message) => {
                    if throw_if_not_found {
                        return Err(DocstoreError::NotFound(message));
                    }
                    debug!(message = %message, "Item not found, returning none");
                    return Ok((None, stats));
                }
                Outcome::Unexpected { status, message } => {
                    return Err(DocstoreError::UnexpectedStatus { status, message });
                }
                Outcome::Throttled {
                    status,
                    retry_after,
                } => {
                    let exhausted = DocstoreError::RetriesExhausted {
                        retries: stats.retries,
                        last_status: status,
                    };
                    if self.policy.max_retries.is_some_and(|max| stats.retries >= max) {
                        return Err(exhausted);
                    }

                    let delay = self.policy.delay_for(stats.retries, retry_after);
                    if let Some(max_elapsed) = self.policy.max_elapsed {
                        if started.elapsed() + delay > max_elapsed {
                            return Err(exhausted);
                        }
                    }

                    warn!(
                        retry = stats.retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        server_hint_ms = retry_after.map(|d| d.as_millis() as u64),
                        "Request throttled, backing off"
                    );
                    self.backoff(delay).await?;

                    stats.retries += 1;
                    stats.delays.push(delay);
                }
            }
        }
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(signal) if signal.is_cancelled() => Err(DocstoreError::Cancelled),
            _ => Ok(()),
        }
    }

    async fn backoff(&self, delay: Duration) -> Result<()> {
        match &self.cancel {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.cancelled() => Err(DocstoreError::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn throttled_then_ok(failures: u32) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<StoreResult>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n < failures {
                Err(StoreError::throttled(None))
            } else {
                Ok(StoreResponse::new(StatusCode::OK))
            })
        };
        (calls, op)
    }

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, None), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(6));
        assert_eq!(
            policy.delay_for(5, Some(Duration::from_millis(100))),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_negative_factor_never_shrinks_delay() {
        let policy = RetryPolicy {
            backoff_factor: -0.5,
            ..RetryPolicy::default()
        };
        for retry in 0..10 {
            assert_eq!(policy.delay_for(retry, None), Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let executor = RequestExecutor::default();
        let (calls, op) = throttled_then_ok(3);

        let (response, stats) = executor.execute_with_stats(op, true).await.unwrap();

        assert_eq!(response.unwrap().status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats.retries, 3);
        assert_eq!(
            stats.delays,
            vec![
                Duration::from_millis(5000),
                Duration::from_millis(6000),
                Duration::from_millis(7000)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling() {
        let policy = RetryPolicy {
            max_retries: Some(2),
            ..RetryPolicy::default()
        };
        let (calls, op) = throttled_then_ok(u32::MAX);

        let err = RequestExecutor::new(policy).execute(op, true).await.unwrap_err();

        assert!(matches!(err, DocstoreError::RetriesExhausted { retries: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_ceiling() {
        let policy = RetryPolicy {
            max_retries: None,
            max_elapsed: Some(Duration::from_secs(12)),
            ..RetryPolicy::default()
        };
        let (_, op) = throttled_then_ok(u32::MAX);

        let err = RequestExecutor::new(policy).execute(op, true).await.unwrap_err();

        // 5s + 6s fit, the third wait of 7s would not.
        assert!(matches!(err, DocstoreError::RetriesExhausted { retries: 2, .. }));
    }

    #[tokio::test]
    async fn test_not_found_modes() {
        let executor = RequestExecutor::default();
        let op = || std::future::ready(Ok(StoreResponse::new(StatusCode::NOT_FOUND)));

        assert!(matches!(
            executor.execute(op, true).await,
            Err(DocstoreError::NotFound(_))
        ));
        assert_eq!(executor.execute(op, false).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unexpected_status_not_retried() {
        let executor = RequestExecutor::default();
        let calls = AtomicU32::new(0);
        let op = || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(StoreError::new(StatusCode::CONFLICT, "conflict")))
        };

        let err = executor.execute(op, true).await.unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let signal = CancelSignal::new();
        signal.cancel();
        let executor = RequestExecutor::default().with_cancel(signal);
        let (calls, op) = throttled_then_ok(0);

        assert!(matches!(
            executor.execute(op, true).await,
            Err(DocstoreError::Cancelled)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
