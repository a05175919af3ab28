//! Retry wrapper metrics regression tests

use super::helpers::*;
use conn_resilience_retry::{RetryConfig, with_retry};
use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn config() -> RetryConfig<&'static str> {
    RetryConfig::retry_on(|e: &&'static str| *e == "pool timed out")
        .max_attempts(3)
        .fixed_backoff(Duration::from_millis(1))
        .build()
}

#[tokio::test]
#[serial]
async fn retry_metrics_exist() {
    init_recorder();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _ = with_retry(
        || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("pool timed out") } else { Ok(n) } }
        },
        "metrics_success",
        &config(),
    )
    .await;

    assert_counter_with_labels(
        "retry_calls_total",
        &[("operation", "metrics_success"), ("result", "success")],
    );
}

#[tokio::test]
#[serial]
async fn retry_exhausted_and_ignored_metrics() {
    init_recorder();

    let _: Result<(), _> =
        with_retry(|| async { Err("pool timed out") }, "metrics_exhausted", &config()).await;
    let _: Result<(), _> =
        with_retry(|| async { Err("constraint") }, "metrics_ignored", &config()).await;

    assert_counter_with_labels(
        "retry_calls_total",
        &[("operation", "metrics_exhausted"), ("result", "exhausted")],
    );
    assert_counter_with_labels(
        "retry_calls_total",
        &[("operation", "metrics_ignored"), ("result", "ignored")],
    );
}
