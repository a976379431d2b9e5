//! Resilient HTTP fetching.
//!
//! Defines the `HttpSource` transport trait and a retrying fetcher on top
//! of it. Failed attempts back off linearly: the wait after attempt `n`
//! is `base_delay * n`.

pub mod http;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{FetchError, SyncError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Attempts per request when nothing else is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Backoff unit (ms).
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Abstraction over a plain HTTP GET returning the body as text.
///
/// A non-2xx status must come back as `FetchError::Status`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpSource: Send + Sync {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ResilientFetcher {
    source: Arc<dyn HttpSource>,
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(source: Arc<dyn HttpSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch `url` using the configured attempt limit.
    pub async fn fetch(&self, url: &str) -> Result<String, SyncError> {
        self.fetch_with_attempts(url, self.policy.max_attempts).await
    }

    /// Fetch `url`, trying at most `max_attempts` times (at least once).
    ///
    /// Returns `SyncError::Network` with the last failure once the
    /// attempts are used up.
    pub async fn fetch_with_attempts(
        &self,
        url: &str,
        max_attempts: u32,
    ) -> Result<String, SyncError> {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.source.get_text(url).await {
                Ok(body) => {
                    debug!(url, attempt, bytes = body.len(), "Fetched");
                    return Ok(body);
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(url, attempt, error = %e, "Giving up after final attempt");
                    return Err(SyncError::Network {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use tokio::time::Instant;

    const URL: &str = "https://api.example.com/dex_risks";

    fn fetcher(mock: MockHttpSource, max_attempts: u32) -> ResilientFetcher {
        ResilientFetcher::new(
            Arc::new(mock),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1000),
            },
        )
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_is_linear_and_increasing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(3000));
        for n in 1..10 {
            assert!(policy.delay_after(n + 1) > policy.delay_after(n));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let mut mock = MockHttpSource::new();
        mock.expect_get_text()
            .times(1)
            .returning(|_| Ok("{}".to_string()));

        let started = Instant::now();
        let body = fetcher(mock, 3).fetch(URL).await.unwrap();
        assert_eq!(body, "{}");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_failures() {
        let mut seq = Sequence::new();
        let mut mock = MockHttpSource::new();
        mock.expect_get_text()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FetchError::Status(502)));
        mock.expect_get_text()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FetchError::Transport("connection reset".into())));
        mock.expect_get_text()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("[]".to_string()));

        let started = Instant::now();
        let body = fetcher(mock, 3).fetch(URL).await.unwrap();
        assert_eq!(body, "[]");
        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts() {
        let mut mock = MockHttpSource::new();
        mock.expect_get_text()
            .times(3)
            .returning(|_| Err(FetchError::Status(500)));

        let started = Instant::now();
        let err = fetcher(mock, 3).fetch(URL).await.unwrap_err();
        match err {
            SyncError::Network { url, attempts, source } => {
                assert_eq!(url, URL);
                assert_eq!(attempts, 3);
                assert_eq!(source, FetchError::Status(500));
            }
            other => panic!("unexpected error: {other}"),
        }
        // No wait after the final attempt.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_carries_last_cause() {
        let mut seq = Sequence::new();
        let mut mock = MockHttpSource::new();
        mock.expect_get_text()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FetchError::Status(500)));
        mock.expect_get_text()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(FetchError::Transport("timed out".into())));

        let err = fetcher(mock, 2).fetch(URL).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_attempt_limit() {
        let mut mock = MockHttpSource::new();
        mock.expect_get_text()
            .times(5)
            .returning(|_| Err(FetchError::Status(429)));

        let err = fetcher(mock, 3).fetch_with_attempts(URL, 5).await.unwrap_err();
        assert!(matches!(err, SyncError::Network { attempts: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let mut mock = MockHttpSource::new();
        mock.expect_get_text()
            .times(1)
            .returning(|_| Err(FetchError::Status(404)));

        let err = fetcher(mock, 0).fetch(URL).await.unwrap_err();
        assert!(matches!(err, SyncError::Network { attempts: 1, .. }));
    }
}
