//! Delay schedules.

use super::{QueryError, flaky, is_pool_timeout};
use conn_resilience_retry::{FnInterval, RetryConfig, with_retry};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tokio::time::Instant;

async fn elapsed_until_exhausted(config: RetryConfig<QueryError>) -> Duration {
    let calls = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let _ = with_retry(flaky(&calls, usize::MAX), "op", &config).await;
    start.elapsed()
}

#[tokio::test(start_paused = true)]
async fn default_backoff_is_one_second_linear() {
    let config = RetryConfig::builder().retry_on(is_pool_timeout).build();

    // 1s after attempt 1, 2s after attempt 2
    assert_eq!(elapsed_until_exhausted(config).await, Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn linear_backoff_scales_with_attempt() {
    let config = RetryConfig::builder()
        .max_attempts(4)
        .base_delay(Duration::from_millis(200))
        .retry_on(is_pool_timeout)
        .build();

    // 200 + 400 + 600
    assert_eq!(
        elapsed_until_exhausted(config).await,
        Duration::from_millis(1200)
    );
}

#[tokio::test(start_paused = true)]
async fn fixed_backoff() {
    let config = RetryConfig::builder()
        .max_attempts(4)
        .fixed_backoff(Duration::from_millis(250))
        .retry_on(is_pool_timeout)
        .build();

    assert_eq!(
        elapsed_until_exhausted(config).await,
        Duration::from_millis(750)
    );
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff() {
    let config = RetryConfig::builder()
        .max_attempts(4)
        .exponential_backoff(Duration::from_millis(100))
        .retry_on(is_pool_timeout)
        .build();

    // 100 + 200 + 400
    assert_eq!(
        elapsed_until_exhausted(config).await,
        Duration::from_millis(700)
    );
}

#[tokio::test(start_paused = true)]
async fn custom_backoff_function() {
    let config = RetryConfig::builder()
        .max_attempts(3)
        .backoff(FnInterval::new(|attempt| {
            Duration::from_secs(10 * attempt as u64)
        }))
        .retry_on(is_pool_timeout)
        .build();

    assert_eq!(elapsed_until_exhausted(config).await, Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn no_delay_without_retry() {
    let config = RetryConfig::builder()
        .base_delay(Duration::from_secs(60))
        .retry_on(|_: &QueryError| false)
        .build();

    assert_eq!(elapsed_until_exhausted(config).await, Duration::ZERO);
}
