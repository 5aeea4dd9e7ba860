//! Typed error taxonomy and retry policy.
//!
//! Errors are raised as explicit variants at the point of failure; no
//! string-matching categorization. Transient failures (network, storage,
//! rate limits) are retried with exponential backoff and jitter; parsing
//! and validation failures are never retried.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Upstream fetch/API failure. Recoverable unless a 4xx client error.
    #[error("network error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
    },

    /// Malformed source document. Requires a source fix, never retried.
    #[error("parse error: {0}")]
    Parsing(String),

    /// Bad input shape. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Index/persistence failure. Often transient.
    #[error("storage error: {0}")]
    Storage(String),

    /// Upstream throttling. Retried with backoff honoring retry_after.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimit { retry_after: Option<Duration> },

    /// Embedding or completion provider failure.
    #[error("provider error: {0}")]
    Provider(String),
}

impl RagError {
    /// Whether a bounded retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::Network { status, .. } => {
                // 4xx means the request itself is wrong; retrying won't help.
                !matches!(status, Some(s) if (400..500).contains(s))
            }
            RagError::Storage(_) | RagError::RateLimit { .. } => true,
            RagError::Parsing(_) | RagError::Validation(_) | RagError::Provider(_) => false,
        }
    }

    /// Server-suggested delay, when the upstream provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RagError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Retry policy: bounded attempts, exponential backoff, jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based), with up to 25% jitter.
    pub fn delay_for(&self, attempt: u32, suggested: Option<Duration>) -> Duration {
        if let Some(d) = suggested {
            return d.min(self.max_delay);
        }
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        let jitter_ms = (capped.as_millis() as f64 * 0.25 * rand::random::<f64>()) as u64;
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Run an async operation with the given retry policy.
///
/// Non-transient errors are returned immediately; transient errors are
/// retried until attempts are exhausted.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RagError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RagError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt, err.retry_after());
                tracing::warn!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
