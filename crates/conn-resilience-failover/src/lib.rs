//! Database connection establishment with retry, backoff and failover.
//!
//! This crate owns the path from a connection string to a live, verified
//! database connection. It builds a target per attempt, probes it, retries
//! transient failures with backoff and, in production, falls back from the
//! connection pooler to a direct connection when the pooler stays
//! unreachable.
//!
//! # Features
//!
//! - **Strategy builder**: one connection string, rendered for the pooled
//!   (pgbouncer) or direct endpoint
//! - **Failure classification**: timeouts and unreachable endpoints are
//!   retried, authentication and unknown failures are not
//! - **Pluggable backoff**: reuse `IntervalFunction` from the retry crate
//! - **Single-flight sessions**: concurrent callers share one connection
//!   attempt
//! - **Event system**: [`FailoverEvent`]s mirrored onto `tracing`
//! - **PostgreSQL**: a sqlx-backed [`PgConnector`] (feature `postgres`)
//!
//! # Examples
//!
//! ```rust,no_run
//! use conn_resilience_failover::{EnvironmentContext, Failover, FailoverConfig, PgConnector};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = FailoverConfig::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_secs(5))
//!     .on_escalation(|attempts| {
//!         println!("pooler unreachable after {attempts} attempts, going direct");
//!     })
//!     .build();
//!
//! let db = Failover::new(PgConnector::new(), EnvironmentContext::from_env(), config);
//!
//! if db.test_connection().await {
//!     println!("connected via {:?}", db.active_strategy());
//! }
//!
//! tokio::spawn({
//!     let db = db.clone();
//!     async move { db.shutdown_on_signal().await }
//! });
//! # }
//! ```

mod config;
mod env;
mod error;
mod events;
mod facade;
#[cfg(feature = "postgres")]
mod postgres;
mod probe;
mod scheduler;
mod state;
mod target;

pub use config::{
    EscalationPolicy, FailoverConfig, FailoverConfigBuilder, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_DELAY,
};
pub use env::{EnvironmentContext, Mode, DATABASE_URL_VAR, FALLBACK_MODE_VAR, MODE_VAR};
pub use error::{
    ConfigurationError, ConnectFailure, ConnectionError, FailureKind, PUBLIC_UNAVAILABLE_MESSAGE,
    SERVICE_UNAVAILABLE,
};
pub use events::FailoverEvent;
pub use facade::Failover;
#[cfg(feature = "postgres")]
pub use postgres::{classify, is_pool_exhaustion, PgConnector};
pub use probe::{probe, AttemptOutcome, Connector};
pub use scheduler::{run_session, Established};
pub use state::{SessionState, SessionTracker};
pub use target::{
    build, build_with, ConnectionTarget, StrategyKind, StrategySettings, StrategySettingsBuilder,
    DEFAULT_POSTGRES_PORT,
};

// Re-export backoff strategies from the retry crate for convenience
pub use conn_resilience_retry::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
    LinearBackoff,
};
