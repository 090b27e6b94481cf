//! Per-adapter request pacing and retry.
//!
//! Every adapter owns one `RateLimiter`. It enforces a minimum interval
//! between requests, backs off on HTTP 429 (honouring `Retry-After`) and
//! retries 5xx / timeouts a bounded number of times with a fixed wait.
//! Running out of retries yields `Ok(None)` so the caller can degrade to an
//! empty result instead of failing the pipeline.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::SourceError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub min_interval: Duration,
    pub max_rate_limit_retries: u32,
    /// Wait for the first 429 when the server sends no `Retry-After`.
    pub rate_limit_base_wait: Duration,
    /// Added per further 429.
    pub rate_limit_step: Duration,
    pub max_server_retries: u32,
    pub server_retry_wait: Duration,
}

impl RetryPolicy {
    /// 1.1 s between calls with an API key, 10 s without.
    pub fn semantic_scholar(has_api_key: bool) -> Self {
        Self {
            min_interval: if has_api_key { Duration::from_millis(1100) } else { Duration::from_secs(10) },
            max_rate_limit_retries: 5,
            rate_limit_base_wait: Duration::from_secs(60),
            rate_limit_step: Duration::from_secs(30),
            max_server_retries: 2,
            server_retry_wait: Duration::from_secs(10),
        }
    }

    pub fn arxiv() -> Self {
        Self {
            min_interval: Duration::from_secs(3),
            max_rate_limit_retries: 3,
            rate_limit_base_wait: Duration::from_secs(60),
            rate_limit_step: Duration::ZERO,
            max_server_retries: 2,
            server_retry_wait: Duration::from_secs(5),
        }
    }

    pub fn crossref() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_rate_limit_retries: 3,
            rate_limit_base_wait: Duration::from_secs(30),
            rate_limit_step: Duration::ZERO,
            max_server_retries: 2,
            server_retry_wait: Duration::from_secs(5),
        }
    }

    /// No pacing and no waits, for tests and local mocks.
    pub fn immediate() -> Self {
        Self {
            min_interval: Duration::ZERO,
            max_rate_limit_retries: 0,
            rate_limit_base_wait: Duration::ZERO,
            rate_limit_step: Duration::ZERO,
            max_server_retries: 0,
            server_retry_wait: Duration::ZERO,
        }
    }

    /// Wait before retry number `attempt` (0-based) after a 429.
    pub fn rate_limit_wait(&self, retry_after_secs: Option<u64>, attempt: u32) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs),
            None => self.rate_limit_base_wait + self.rate_limit_step * attempt,
        }
    }
}

/// What to do with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accept,
    RateLimited,
    ServerError,
}

pub fn classify(status: StatusCode) -> Disposition {
    match status.as_u16() {
        429 => Disposition::RateLimited,
        500 | 502 | 503 | 504 => Disposition::ServerError,
        _ => Disposition::Accept,
    }
}

pub struct RateLimiter {
    policy: RetryPolicy,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, last_request: Mutex::new(None) }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sleep until `min_interval` has passed since the previous request,
    /// then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.policy.min_interval {
                tokio::time::sleep(self.policy.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Run `send` under the pacing and retry policy.
    ///
    /// Returns the first response that is neither 429 nor a retryable 5xx,
    /// or `Ok(None)` once the retry budget is used up.
    pub async fn execute<F, Fut>(&self, label: &str, mut send: F) -> Result<Option<reqwest::Response>, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, SourceError>>,
    {
        let mut rate_limit_attempts = 0u32;
        let mut server_attempts = 0u32;

        loop {
            self.acquire().await;

            let outcome = send().await;
            let retry_server = match outcome {
                Ok(resp) => match classify(resp.status()) {
                    Disposition::Accept => return Ok(Some(resp)),
                    Disposition::RateLimited => {
                        if rate_limit_attempts >= self.policy.max_rate_limit_retries {
                            warn!(source = label, "Rate limit retries exhausted, giving up");
                            return Ok(None);
                        }
                        let retry_after = retry_after_secs(&resp);
                        let wait = self.policy.rate_limit_wait(retry_after, rate_limit_attempts);
                        rate_limit_attempts += 1;
                        warn!(
                            source = label,
                            attempt = rate_limit_attempts,
                            wait_secs = wait.as_secs(),
                            "Rate limited (429), backing off"
                        );
                        tokio::time::sleep(wait).await;
                        false
                    }
                    Disposition::ServerError => {
                        debug!(source = label, status = resp.status().as_u16(), "Server error");
                        true
                    }
                },
                Err(SourceError::Http(e)) if e.is_timeout() || e.is_connect() => {
                    debug!(source = label, error = %e, "Transient network error");
                    true
                }
                Err(e) => return Err(e),
            };

            if retry_server {
                if server_attempts >= self.policy.max_server_retries {
                    warn!(source = label, "Server retries exhausted, giving up");
                    return Ok(None);
                }
                server_attempts += 1;
                tokio::time::sleep(self.policy.server_retry_wait).await;
            }
        }
    }
}

fn retry_after_secs(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_statuses() {
        assert_eq!(classify(StatusCode::OK), Disposition::Accept);
        assert_eq!(classify(StatusCode::NOT_FOUND), Disposition::Accept);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), Disposition::RateLimited);
        assert_eq!(classify(StatusCode::GATEWAY_TIMEOUT), Disposition::ServerError);
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), Disposition::ServerError);
    }

    #[test]
    fn test_rate_limit_wait_grows_without_retry_after() {
        let p = RetryPolicy::semantic_scholar(true);
        assert_eq!(p.rate_limit_wait(None, 0), Duration::from_secs(60));
        assert_eq!(p.rate_limit_wait(None, 2), Duration::from_secs(120));
        assert_eq!(p.rate_limit_wait(Some(7), 4), Duration::from_secs(7));
    }

    #[test]
    fn test_semantic_scholar_interval_depends_on_key() {
        assert!(RetryPolicy::semantic_scholar(false).min_interval > RetryPolicy::semantic_scholar(true).min_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_enforces_min_interval() {
        let limiter = RateLimiter::new(RetryPolicy {
            min_interval: Duration::from_secs(3),
            ..RetryPolicy::immediate()
        });
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_propagates_non_transient_errors() {
        let limiter = RateLimiter::new(RetryPolicy::immediate());
        let result = limiter
            .execute("test", || async { Err(SourceError::parse("test", "bad")) })
            .await;
        assert!(matches!(result, Err(SourceError::Parse { .. })));
    }
}
