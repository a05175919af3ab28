//! Pool exhaustion as the transient class.

use conn_resilience_failover::{ConnectFailure, ConnectionError, FailureKind};
use conn_resilience_retry::{RetryConfig, TransientError, with_retry};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn pool_exhaustion_is_retried_with_default_config() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = RetryConfig::<ConnectionError>::default();
    let start = tokio::time::Instant::now();

    let rows = with_retry(
        || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(ConnectionError::PoolExhausted(
                        "timed out fetching a new connection from the connection pool".into(),
                    ))
                } else {
                    Ok(vec!["alice", "bob"])
                }
            }
        },
        "list_users",
        &config,
    )
    .await
    .unwrap();

    assert_eq!(rows, ["alice", "bob"]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn other_connection_errors_are_not_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = RetryConfig::<ConnectionError>::transient();

    let result: Result<(), _> = with_retry(
        || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ConnectionError::Fatal(ConnectFailure::new(
                    FailureKind::Other,
                    "syntax error at or near \"SELEC\"",
                )))
            }
        },
        "broken_query",
        &config,
    )
    .await;

    assert!(matches!(result, Err(ConnectionError::Fatal(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn builder_without_predicate_classifies_by_transient_error() {
    let config = RetryConfig::<ConnectionError>::builder()
        .max_attempts(3)
        .base_delay(Duration::from_millis(100))
        .build();

    let fatal_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fatal_calls);
    let result: Result<(), _> = with_retry(
        || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ConnectionError::Fatal(ConnectFailure::new(
                    FailureKind::Other,
                    "relation \"users\" does not exist",
                )))
            }
        },
        "list_users",
        &config,
    )
    .await;

    assert!(matches!(result, Err(ConnectionError::Fatal(_))));
    assert_eq!(fatal_calls.load(Ordering::SeqCst), 1);

    let pool_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pool_calls);
    let result: Result<(), _> = with_retry(
        || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ConnectionError::PoolExhausted("pool_timeout=20s".into())) }
        },
        "list_users",
        &config,
    )
    .await;

    assert!(matches!(result, Err(ConnectionError::PoolExhausted(_))));
    assert_eq!(pool_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_pool_surfaces_original_error() {
    let config = RetryConfig::<ConnectionError>::builder()
        .max_attempts(2)
        .retry_transient()
        .build();

    let result: Result<(), _> = with_retry(
        || async { Err(ConnectionError::PoolExhausted("pool_timeout=20s".into())) },
        "checkout",
        &config,
    )
    .await;

    assert_eq!(
        result,
        Err(ConnectionError::PoolExhausted("pool_timeout=20s".into()))
    );
}

#[test]
fn io_timeouts_are_transient() {
    assert!(io::Error::from(io::ErrorKind::TimedOut).is_transient());
    assert!(!io::Error::from(io::ErrorKind::PermissionDenied).is_transient());
}
