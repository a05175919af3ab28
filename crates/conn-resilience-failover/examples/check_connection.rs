//! Connection diagnostic.
//!
//! Run with: DATABASE_URL=postgres://... APP_ENV=production \
//!     cargo run --example check_connection -p conn-resilience-failover
//!
//! Prints the targets each strategy resolves to, connects with failover,
//! runs one query through the retry wrapper and waits for Ctrl-C.

use conn_resilience_failover::{
    build, ConnectionError, EnvironmentContext, Failover, FailoverConfig, PgConnector,
    StrategyKind,
};
use conn_resilience_retry::{with_retry, RetryConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let env = EnvironmentContext::from_env();
    println!("Mode: {}", env.mode());

    if let Err(e) = env.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    for strategy in [StrategyKind::Pooled, StrategyKind::Direct] {
        let target = build(&env, strategy)?;
        println!("  {:<6} -> {}", strategy, target);
    }

    let config = FailoverConfig::builder()
        .base_delay(Duration::from_secs(5))
        .probe_timeout(Duration::from_secs(30))
        .on_escalation(|attempts| {
            println!("Pooled endpoint failed {} times, trying direct", attempts);
        })
        .build();
    let db = Failover::new(
        PgConnector::new().application_name("check_connection"),
        env,
        config,
    );

    if let Err(e) = db.ensure_ready().await {
        eprintln!("HTTP {}: {}", e.status_code(), e.public_message(db.mode()));
        eprintln!("Detail: {}", e);
        return Ok(());
    }
    println!("Connected via {:?}", db.active_strategy());

    if let Some(pool) = db.handle() {
        let retry = RetryConfig::<ConnectionError>::transient();
        let version: String = with_retry(
            || async {
                sqlx::query_scalar("SELECT version()")
                    .fetch_one(&*pool)
                    .await
                    .map_err(ConnectionError::from)
            },
            "server_version",
            &retry,
        )
        .await?;
        println!("Server: {}", version);
    }

    println!("Press Ctrl-C to disconnect");
    db.shutdown_on_signal().await?;
    println!("Disconnected");
    Ok(())
}
