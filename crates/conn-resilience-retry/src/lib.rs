//! Transient-error-aware retry for arbitrary async operations.
//!
//! [`with_retry`] re-runs a unit of work while it fails with an error the
//! configured predicate classifies as transient (for example, an exhausted
//! connection pool). Any other failure is returned on first occurrence
//! without consuming a retry. Once the attempt budget runs out the last
//! error is returned as-is, so callers keep their own error type.
//!
//! # Features
//!
//! - **Pluggable backoff**: linear (default), fixed, exponential, jittered
//!   exponential, or any `Fn(attempt) -> Duration`
//! - **Transient classification**: [`TransientError`] through
//!   [`RetryConfig::builder`], or any predicate through [`RetryConfig::retry_on`]
//! - **Event system**: [`RetryEvent`] callbacks mirrored onto `tracing`
//!
//! # Examples
//!
//! ```
//! use conn_resilience_retry::{with_retry, RetryConfig};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! enum QueryError {
//!     PoolTimedOut,
//!     NotFound,
//! }
//!
//! impl std::fmt::Display for QueryError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! # async fn example() -> Result<(), QueryError> {
//! let config = RetryConfig::retry_on(|e: &QueryError| matches!(e, QueryError::PoolTimedOut))
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100))
//!     .build();
//!
//! let rows = with_retry(|| async { Ok::<_, QueryError>(42) }, "count_rows", &config).await?;
//! assert_eq!(rows, 42);
//! # Ok(())
//! # }
//! ```

mod backoff;
mod config;
mod events;
mod policy;

pub use backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
    LinearBackoff,
};
pub use config::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;
pub use policy::{RetryPolicy, RetryPredicate, TransientError};

use std::fmt;
use std::future::Future;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Runs `operation`, retrying it while it fails with a retryable error.
///
/// - A non-retryable error is returned immediately (one invocation).
/// - A retryable error on attempt `n < max_attempts` sleeps for the policy's
///   backoff of `n`, then re-runs the operation.
/// - A retryable error on the last attempt is logged with `name` and the
///   attempt count, then returned unchanged.
///
/// The function keeps all of its state on its own stack, so concurrent calls
/// sharing one `config` do not interfere.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    name: &str,
    config: &RetryConfig<E>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let policy = &config.policy;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = name,
                        attempts = attempt,
                        "operation succeeded after retry"
                    );
                }
                #[cfg(feature = "metrics")]
                counter!(
                    "retry_calls_total",
                    "operation" => name.to_string(),
                    "result" => "success"
                )
                .increment(1);

                config.event_listeners.emit(&RetryEvent::Success {
                    operation: name.to_string(),
                    timestamp: Instant::now(),
                    attempts: attempt,
                });
                return Ok(value);
            }
            Err(error) => {
                if !policy.should_retry(&error) {
                    #[cfg(feature = "metrics")]
                    counter!(
                        "retry_calls_total",
                        "operation" => name.to_string(),
                        "result" => "ignored"
                    )
                    .increment(1);

                    config.event_listeners.emit(&RetryEvent::IgnoredError {
                        operation: name.to_string(),
                        timestamp: Instant::now(),
                        attempt,
                        error: error.to_string(),
                    });
                    return Err(error);
                }

                if attempt >= policy.max_attempts {
                    tracing::error!(
                        operation = name,
                        attempts = attempt,
                        error = %error,
                        "{} failed after {} attempts",
                        name,
                        attempt
                    );
                    #[cfg(feature = "metrics")]
                    counter!(
                        "retry_calls_total",
                        "operation" => name.to_string(),
                        "result" => "exhausted"
                    )
                    .increment(1);

                    config.event_listeners.emit(&RetryEvent::Error {
                        operation: name.to_string(),
                        timestamp: Instant::now(),
                        attempts: attempt,
                        error: error.to_string(),
                    });
                    return Err(error);
                }

                let delay = policy.next_backoff(attempt);
                tracing::warn!(
                    operation = name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "{} failed (attempt {}/{}), retrying",
                    name,
                    attempt,
                    policy.max_attempts
                );
                config.event_listeners.emit(&RetryEvent::Retry {
                    operation: name.to_string(),
                    timestamp: Instant::now(),
                    attempt,
                    delay,
                    error: error.to_string(),
                });

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
