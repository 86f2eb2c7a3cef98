//! services/dashboard/src/http/retry.rs
//!
//! Which failures are retried and how long to wait between attempts.

use std::time::Duration;

use reqwest::Method;

use super::error::HttpError;

/// Statuses worth another attempt.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self::new(0)
    }

    /// Whether the failed `attempt` (0-based) of `method` may be repeated.
    pub fn should_retry(&self, method: &Method, error: &HttpError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match error {
            HttpError::Status { status, .. } => is_retryable_status(*status),
            // The server may have acted on a non-idempotent request already.
            HttpError::Network(_) | HttpError::Timeout(_) => is_idempotent(method),
            HttpError::Cancelled | HttpError::SessionExpired | HttpError::Decode(_) => false,
        }
    }

    /// Backoff before retry number `attempt + 1`; a server-provided
    /// `Retry-After` wins when present, still bounded by `max_delay`.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(wait) = retry_after {
            return wait.min(self.max_delay);
        }
        self.base_delay
            .checked_mul(1u32 << attempt.min(20))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE
    )
}

/// Reads a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> HttpError {
        HttpError::Status {
            status: code,
            message: String::new(),
        }
    }

    #[test]
    fn retries_listed_statuses_only() {
        let policy = RetryPolicy::default();
        for code in RETRYABLE_STATUSES {
            assert!(policy.should_retry(&Method::POST, &status(code), 0));
        }
        assert!(!policy.should_retry(&Method::GET, &status(400), 0));
        assert!(!policy.should_retry(&Method::GET, &status(401), 0));
        assert!(!policy.should_retry(&Method::GET, &status(404), 0));
    }

    #[test]
    fn network_errors_retry_only_when_idempotent() {
        let policy = RetryPolicy::default();
        let err = HttpError::Network("reset".into());
        assert!(policy.should_retry(&Method::GET, &err, 0));
        assert!(!policy.should_retry(&Method::POST, &err, 0));
        assert!(!policy.should_retry(&Method::GET, &HttpError::Cancelled, 0));
    }

    #[test]
    fn stops_after_max_retries() {
        let policy = RetryPolicy::new(2);
        assert!(policy.should_retry(&Method::GET, &status(503), 1));
        assert!(!policy.should_retry(&Method::GET, &status(503), 2));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0, None), Duration::from_millis(500));
        assert_eq!(policy.delay(1, None), Duration::from_millis(1000));
        assert_eq!(policy.delay(2, None), Duration::from_millis(2000));
        assert_eq!(policy.delay(10, None), Duration::from_secs(10));
        assert_eq!(
            policy.delay(0, parse_retry_after(Some("3"))),
            Duration::from_secs(3)
        );
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
    }
}
