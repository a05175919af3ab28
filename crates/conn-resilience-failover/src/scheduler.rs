//! Retry scheduler: drives probes through backoff and escalation.

use crate::config::FailoverConfig;
use crate::env::EnvironmentContext;
use crate::error::ConnectionError;
use crate::events::FailoverEvent;
use crate::probe::{probe, AttemptOutcome, Connector};
use crate::state::{SessionState, SessionTracker};
use crate::target::{self, StrategyKind};
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::counter;

/// A connection produced by a successful session.
#[derive(Debug)]
pub struct Established<C> {
    /// The live connection.
    pub handle: C,
    /// Strategy of the successful probe.
    pub strategy: StrategyKind,
    /// Probes the session spent, across strategies.
    pub probes: usize,
}

/// Runs one connection session to completion.
///
/// The session starts on [`StrategyKind::Pooled`] at attempt 1 and probes
/// strictly one at a time:
///
/// - success ends the session with the connection
/// - a retryable failure before `max_attempts` sleeps for the configured
///   backoff and tries again on the same strategy
/// - a retryable failure on the last pooled attempt escalates to
///   [`StrategyKind::Direct`] at attempt 1, once, when the escalation policy
///   allows it in the current mode
/// - a retryable failure on the last attempt otherwise ends the session with
///   [`ConnectionError::Exhausted`]
/// - a non-retryable failure ends the session at once
///
/// A missing or malformed connection string fails before any probe.
///
/// On failure the tracker is left in [`SessionState::Exhausted`]. On success
/// it is left as is; the caller decides whether to install the handle and
/// mark the tracker ready.
pub async fn run_session<C>(
    connector: &C,
    env: &EnvironmentContext,
    config: &FailoverConfig,
    tracker: &SessionTracker,
) -> Result<Established<C::Connection>, ConnectionError>
where
    C: Connector + ?Sized,
{
    tracker.record_session();

    if let Err(error) = env.validate() {
        tracing::error!(
            event = "configuration_error",
            source = config.name(),
            error = %error,
            "database configuration invalid"
        );
        tracker.transition(SessionState::Exhausted);
        return Err(error.into());
    }

    let escalation_allowed = config.escalation().allows(env.mode());
    let mut strategy = StrategyKind::Pooled;
    let mut attempt = 1;
    let mut probes = 0;

    config.emit(FailoverEvent::StrategySelected {
        name: config.name().to_string(),
        timestamp: Instant::now(),
        strategy,
        mode: env.mode(),
    });

    loop {
        tracker.transition(SessionState::Attempting { strategy, attempt });

        let target = match target::build_with(env, strategy, config.settings()) {
            Ok(target) => target,
            Err(error) => {
                tracker.transition(SessionState::Exhausted);
                return Err(error.into());
            }
        };

        probes += 1;
        tracker.record_probe();

        let failure = match probe(connector, &target, config.probe_timeout()).await {
            AttemptOutcome::Success(handle) => {
                #[cfg(feature = "metrics")]
                counter!(
                    "db_connection_attempts_total",
                    "strategy" => strategy.as_str(),
                    "outcome" => "success"
                )
                .increment(1);

                config.emit(FailoverEvent::Connected {
                    name: config.name().to_string(),
                    timestamp: Instant::now(),
                    strategy,
                    attempt,
                    probes,
                });
                return Ok(Established {
                    handle,
                    strategy,
                    probes,
                });
            }
            AttemptOutcome::Failure(failure) => failure,
        };

        #[cfg(feature = "metrics")]
        counter!(
            "db_connection_attempts_total",
            "strategy" => strategy.as_str(),
            "outcome" => failure.kind().as_str()
        )
        .increment(1);

        if !failure.is_retryable() {
            config.emit(FailoverEvent::FatalFailure {
                name: config.name().to_string(),
                timestamp: Instant::now(),
                strategy,
                attempt,
                kind: failure.kind(),
                error: failure.message().to_string(),
                code: failure.code().map(str::to_string),
            });
            tracker.transition(SessionState::Exhausted);
            return Err(ConnectionError::from_fatal(failure));
        }

        config.emit(FailoverEvent::AttemptFailed {
            name: config.name().to_string(),
            timestamp: Instant::now(),
            strategy,
            attempt,
            kind: failure.kind(),
            error: failure.message().to_string(),
            code: failure.code().map(str::to_string),
        });

        if attempt < config.max_attempts() {
            let delay = config.next_backoff(attempt);
            config.emit(FailoverEvent::RetryScheduled {
                name: config.name().to_string(),
                timestamp: Instant::now(),
                strategy,
                attempt,
                delay,
            });
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        if strategy == StrategyKind::Pooled && escalation_allowed {
            tracker.transition(SessionState::Escalated);
            tracker.record_escalation();

            #[cfg(feature = "metrics")]
            counter!("db_connection_escalations_total").increment(1);

            config.emit(FailoverEvent::Escalated {
                name: config.name().to_string(),
                timestamp: Instant::now(),
                from: StrategyKind::Pooled,
                to: StrategyKind::Direct,
                attempts: attempt,
            });
            strategy = StrategyKind::Direct;
            attempt = 1;
            continue;
        }

        let error = ConnectionError::Exhausted {
            attempts: probes,
            strategy,
            last: failure,
        };
        config.emit(FailoverEvent::Exhausted {
            name: config.name().to_string(),
            timestamp: Instant::now(),
            strategy,
            probes,
            error: error.to_string(),
        });
        tracker.transition(SessionState::Exhausted);
        return Err(error);
    }
}
