//! Retry with exponential backoff for text-generation calls.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tracing::warn;

use crate::error::LlmError;

/// How often and how patiently a failed request is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(600),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            multiplier: self.multiplier,
            randomization_factor: 0.0,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Rate limits, timeouts, connection failures and 5xx are transient.
/// Every other 4xx is final.
pub fn is_retryable(err: &LlmError) -> bool {
    match err {
        LlmError::RateLimited { .. } | LlmError::Timeout { .. } => true,
        LlmError::RequestFailed { status: None, .. } => true,
        LlmError::RequestFailed {
            status: Some(status),
            ..
        } => *status >= 500,
        LlmError::InvalidRequest { .. }
        | LlmError::AuthFailed { .. }
        | LlmError::InvalidResponse { .. } => false,
    }
}

/// Run `op` until it succeeds, fails terminally, or runs out of attempts.
///
/// A server-provided `retry-after` wins over the computed delay when longer.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                let computed = backoff.next_backoff().unwrap_or(policy.initial_interval);
                let delay = match &err {
                    LlmError::RateLimited {
                        retry_after: Some(after),
                        ..
                    } => computed.max(*after),
                    _ => computed,
                };
                warn!(attempt, ?delay, error = %err, "Request failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_interval: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    fn server_error(status: u16) -> LlmError {
        LlmError::RequestFailed {
            provider: "test".into(),
            status: Some(status),
            reason: "boom".into(),
        }
    }

    #[test]
    fn classification() {
        assert!(is_retryable(&server_error(500)));
        assert!(is_retryable(&server_error(529)));
        assert!(is_retryable(&LlmError::Timeout {
            provider: "test".into()
        }));
        assert!(is_retryable(&LlmError::RateLimited {
            provider: "test".into(),
            retry_after: None
        }));
        assert!(is_retryable(&LlmError::RequestFailed {
            provider: "test".into(),
            status: None,
            reason: "connection refused".into()
        }));
        assert!(!is_retryable(&LlmError::InvalidRequest {
            provider: "test".into(),
            status: 400,
            reason: "bad".into()
        }));
        assert!(!is_retryable(&LlmError::AuthFailed {
            provider: "test".into()
        }));
    }

    #[test]
    fn default_backoff_doubles_from_600ms() {
        let mut backoff = RetryPolicy::default().backoff();
        let delays: Vec<Duration> = (0..4).filter_map(|_| backoff.next_backoff()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(600),
                Duration::from_millis(1200),
                Duration::from_millis(2400),
                Duration::from_millis(4800),
            ]
        );
    }

    #[tokio::test]
    async fn transient_errors_use_every_attempt() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = with_retry(&fast_policy(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(server_error(503))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = with_retry(&fast_policy(), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::InvalidRequest {
                provider: "test".into(),
                status: 400,
                reason: "bad model".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(LlmError::InvalidRequest { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_rate_limit() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = with_retry(&fast_policy(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LlmError::RateLimited {
                    provider: "test".into(),
                    retry_after: Some(Duration::from_millis(5)),
                })
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
