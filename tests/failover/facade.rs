//! Handle ownership, shutdown and concurrent callers.

use super::{production, production_with};
use crate::support::ScriptedConnector;
use conn_resilience_failover::{
    ConnectionError, FailoverConfig, FailureKind, SessionState, StrategyKind,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn ensure_ready_is_idempotent() {
    let db = production(ScriptedConnector::healthy());

    db.ensure_ready().await.unwrap();
    db.ensure_ready().await.unwrap();
    assert!(db.test_connection().await);

    assert_eq!(db.connector().probes(), 1);
    assert_eq!(db.tracker().sessions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_reports_failure_as_false() {
    let db = production(ScriptedConnector::failing(FailureKind::Timeout));

    assert!(!db.test_connection().await);
    assert_eq!(db.state(), SessionState::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_session() {
    let db = production(
        ScriptedConnector::failing_times(FailureKind::Timeout, 1)
            .with_delay(Duration::from_millis(50)),
    );

    let results = join_all((0..16).map(|_| db.ensure_ready())).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(db.connector().probes(), 2);
    assert_eq!(db.tracker().sessions(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_a_failure() {
    let db = production(ScriptedConnector::failing(FailureKind::AuthenticationFailure));

    let results = join_all((0..4).map(|_| db.ensure_ready())).await;

    assert!(
        results
            .iter()
            .all(|r| matches!(r, Err(ConnectionError::Authentication(_))))
    );
    assert_eq!(db.connector().probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn handle_is_shared_and_released_on_shutdown() {
    let db = production(ScriptedConnector::healthy());
    db.ensure_ready().await.unwrap();

    let handle = db.handle().unwrap();
    assert_eq!(handle.strategy, StrategyKind::Pooled);
    assert!(Arc::ptr_eq(&handle, &db.handle().unwrap()));

    db.shutdown().await;

    assert_eq!(db.connector().closes(), 1);
    assert!(db.handle().is_none());
    assert_eq!(db.active_strategy(), None);
    assert_eq!(db.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_safe_to_repeat() {
    let db = production(ScriptedConnector::healthy());

    db.shutdown().await;
    db.shutdown().await;
    assert_eq!(db.connector().closes(), 0);

    db.ensure_ready().await.unwrap();
    db.shutdown().await;
    db.shutdown().await;
    assert_eq!(db.connector().closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn ensure_ready_after_shutdown_reconnects() {
    let db = production(ScriptedConnector::healthy());

    db.ensure_ready().await.unwrap();
    db.shutdown().await;
    db.ensure_ready().await.unwrap();

    assert_eq!(db.connector().probes(), 2);
    assert_eq!(db.handle().map(|h| h.id), Some(2));
}

#[tokio::test(start_paused = true)]
async fn session_finishing_after_shutdown_closes_its_connection() {
    let db = production(ScriptedConnector::healthy().with_delay(Duration::from_secs(10)));

    let pending = tokio::spawn({
        let db = db.clone();
        async move { db.ensure_ready().await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(db.connector().probes(), 1);

    db.shutdown().await;
    let result = pending.await.unwrap();

    assert_eq!(result, Err(ConnectionError::ShutDown));
    assert_eq!(db.connector().closes(), 1);
    assert!(db.handle().is_none());
    assert_eq!(db.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn reconnect_releases_the_stale_handle_first() {
    let db = production(ScriptedConnector::healthy());
    db.ensure_ready().await.unwrap();
    let first = db.handle().unwrap();

    db.reconnect().await.unwrap();

    assert_eq!(db.connector().closes(), 1);
    assert_eq!(db.connector().probes(), 2);
    let second = db.handle().unwrap();
    assert_ne!(first.id, second.id);
}

#[tokio::test(start_paused = true)]
async fn clones_share_the_connection() {
    let config = FailoverConfig::builder().name("primary").build();
    let db = production_with(ScriptedConnector::healthy(), config);
    let clone = db.clone();

    clone.ensure_ready().await.unwrap();

    assert_eq!(db.state(), SessionState::Ready);
    assert!(db.handle().is_some());
    assert_eq!(db.config().name(), "primary");
    assert!(format!("{:?}", db).contains("primary"));
}
