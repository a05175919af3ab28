//! End-to-end connection scenarios.

use super::{development, production, production_with};
use crate::support::{ScriptedConnector, Step};
use conn_resilience_failover::{
    FailoverConfig, FailureKind, SessionState, StrategyKind,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn pooled_recovers_after_two_timeouts() {
    let db = production(ScriptedConnector::failing_times(FailureKind::Timeout, 2));

    db.ensure_ready().await.unwrap();

    assert_eq!(db.state(), SessionState::Ready);
    assert_eq!(db.active_strategy(), Some(StrategyKind::Pooled));
    assert_eq!(db.connector().probes(), 3);
    assert_eq!(db.tracker().escalations(), 0);
}

#[tokio::test(start_paused = true)]
async fn pooled_unreachable_falls_back_to_direct() {
    let escalations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&escalations);
    let config = FailoverConfig::builder()
        .on_escalation(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    let db = production_with(
        ScriptedConnector::failing_times(FailureKind::NetworkUnreachable, 3),
        config,
    );

    db.ensure_ready().await.unwrap();

    assert_eq!(db.state(), SessionState::Ready);
    assert_eq!(db.active_strategy(), Some(StrategyKind::Direct));
    assert_eq!(db.connector().probes(), 4);
    assert_eq!(escalations.load(Ordering::SeqCst), 1);

    let targets = db.connector().targets();
    let direct = targets.last().unwrap();
    assert_eq!(direct.port(), 5432);
    assert_eq!(direct.param("pgbouncer"), None);
    assert_eq!(direct.param("sslmode"), Some("require"));
    assert_eq!(targets[0].port(), 6543);
    assert_eq!(targets[0].param("pgbouncer"), Some("true"));
}

#[tokio::test(start_paused = true)]
async fn development_connects_on_first_probe_without_pooling() {
    let db = development(ScriptedConnector::healthy());

    db.ensure_ready().await.unwrap();

    assert_eq!(db.state(), SessionState::Ready);
    assert_eq!(db.connector().probes(), 1);

    let targets = db.connector().targets();
    let target = &targets[0];
    assert!(!target.pooling());
    assert!(!target.ssl_required());
    assert_eq!(target.param("pgbouncer"), None);
    assert_eq!(target.host(), "localhost");
}

#[tokio::test(start_paused = true)]
async fn short_failure_runs_reach_ready() {
    for kind in [FailureKind::Timeout, FailureKind::NetworkUnreachable] {
        for failures in 0..3 {
            let db = production(ScriptedConnector::failing_times(kind, failures));

            db.ensure_ready().await.unwrap();

            assert_eq!(db.connector().probes(), failures + 1);
            assert_eq!(db.active_strategy(), Some(StrategyKind::Pooled));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn failed_liveness_check_closes_connection_and_retries() {
    let db = production(ScriptedConnector::new([Step::FailPing(FailureKind::Timeout)]));

    db.ensure_ready().await.unwrap();

    assert_eq!(db.connector().probes(), 2);
    assert_eq!(db.connector().closes(), 1);
    assert_eq!(db.handle().map(|h| h.id), Some(2));
}

#[tokio::test(start_paused = true)]
async fn backoff_is_linear_and_escalation_is_immediate() {
    let db = production(ScriptedConnector::failing(FailureKind::Timeout));
    let start = tokio::time::Instant::now();

    let _ = db.ensure_ready().await;

    // 5s + 10s on pooled, no delay on escalation, 5s + 10s on direct
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn probe_timeout_bounds_a_hanging_connect() {
    let config = FailoverConfig::builder()
        .max_attempts(2)
        .base_delay(Duration::from_secs(1))
        .probe_timeout(Duration::from_secs(2))
        .build();
    let db = production_with(
        ScriptedConnector::healthy().with_delay(Duration::from_secs(3600)),
        config,
    );
    let start = tokio::time::Instant::now();

    let err = db.ensure_ready().await.unwrap_err();

    assert_eq!(
        err.failure().map(|f| f.kind()),
        Some(FailureKind::Timeout)
    );
    assert_eq!(db.connector().probes(), 4);
    // four 2s probes, 1s backoff on each strategy
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}
