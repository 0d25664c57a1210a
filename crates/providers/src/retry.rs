//! Exponential backoff for transient external failures.
//!
//! Timeouts and 5xx responses are retried; 4xx responses and every other
//! error class surface immediately.

use std::future::Future;
use std::time::Duration;

use rv_domain::{Error, Result};

/// Retry policy: `max_attempts` total attempts, delay doubling from
/// `base_delay` between them (2s, 4s, 8s, ...).
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Run `op`, retrying transient failures within the attempt budget.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Map a reqwest failure into the shared error taxonomy.
pub fn classify_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Map an HTTP status + body into the shared error taxonomy.
/// 5xx is transient (`Http`), 4xx is permanent (`Provider`).
pub fn classify_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Error {
    if status.is_server_error() {
        Error::Http(format!("{provider} returned {status}: {body}"))
    } else {
        Error::Provider {
            provider: provider.to_string(),
            message: format!("{status}: {body}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let backoff = Backoff::new(3, Duration::from_secs(2));

        let result = backoff
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::Timeout("slow".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let backoff = Backoff::new(3, Duration::from_millis(1));

        let result: Result<()> = backoff
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Error::Provider {
                        provider: "x".into(),
                        message: "400".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_returns_last_error() {
        let backoff = Backoff::new(2, Duration::from_secs(1));
        let result: Result<()> = backoff
            .run("test", || async { Err(Error::Http("503".into())) })
            .await;
        assert!(matches!(result, Err(Error::Http(_))));
    }
}
