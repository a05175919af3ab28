use crate::env::Mode;
use crate::error::FailureKind;
use crate::target::StrategyKind;
use conn_resilience_core::{ResilienceEvent, Severity};
use std::time::{Duration, Instant};

/// Events emitted while establishing and releasing a database connection.
#[derive(Debug, Clone)]
pub enum FailoverEvent {
    /// A session started on `strategy`.
    StrategySelected {
        name: String,
        timestamp: Instant,
        strategy: StrategyKind,
        mode: Mode,
    },
    /// A probe failed with a retryable error.
    AttemptFailed {
        name: String,
        timestamp: Instant,
        strategy: StrategyKind,
        attempt: usize,
        kind: FailureKind,
        error: String,
        code: Option<String>,
    },
    /// The next probe will run after `delay`.
    RetryScheduled {
        name: String,
        timestamp: Instant,
        strategy: StrategyKind,
        /// The attempt that just failed.
        attempt: usize,
        delay: Duration,
    },
    /// Pooled attempts ran out; the session continues on direct.
    Escalated {
        name: String,
        timestamp: Instant,
        from: StrategyKind,
        to: StrategyKind,
        /// Attempts spent on `from`.
        attempts: usize,
    },
    /// A probe succeeded and the handle was installed.
    Connected {
        name: String,
        timestamp: Instant,
        strategy: StrategyKind,
        attempt: usize,
        /// Probes spent by the session, across strategies.
        probes: usize,
    },
    /// A failure that is never retried ended the session.
    FatalFailure {
        name: String,
        timestamp: Instant,
        strategy: StrategyKind,
        attempt: usize,
        kind: FailureKind,
        error: String,
        code: Option<String>,
    },
    /// Every allowed attempt failed.
    Exhausted {
        name: String,
        timestamp: Instant,
        strategy: StrategyKind,
        probes: usize,
        error: String,
    },
    /// The layer was shut down.
    ShutDown {
        name: String,
        timestamp: Instant,
        /// Whether a live handle was closed.
        released: bool,
    },
}

impl ResilienceEvent for FailoverEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FailoverEvent::StrategySelected { .. } => "strategy_selected",
            FailoverEvent::AttemptFailed { .. } => "attempt_failed",
            FailoverEvent::RetryScheduled { .. } => "retry_scheduled",
            FailoverEvent::Escalated { .. } => "escalated",
            FailoverEvent::Connected { .. } => "connected",
            FailoverEvent::FatalFailure { .. } => "fatal_failure",
            FailoverEvent::Exhausted { .. } => "exhausted",
            FailoverEvent::ShutDown { .. } => "shut_down",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            FailoverEvent::StrategySelected { timestamp, .. }
            | FailoverEvent::AttemptFailed { timestamp, .. }
            | FailoverEvent::RetryScheduled { timestamp, .. }
            | FailoverEvent::Escalated { timestamp, .. }
            | FailoverEvent::Connected { timestamp, .. }
            | FailoverEvent::FatalFailure { timestamp, .. }
            | FailoverEvent::Exhausted { timestamp, .. }
            | FailoverEvent::ShutDown { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            FailoverEvent::StrategySelected { name, .. }
            | FailoverEvent::AttemptFailed { name, .. }
            | FailoverEvent::RetryScheduled { name, .. }
            | FailoverEvent::Escalated { name, .. }
            | FailoverEvent::Connected { name, .. }
            | FailoverEvent::FatalFailure { name, .. }
            | FailoverEvent::Exhausted { name, .. }
            | FailoverEvent::ShutDown { name, .. } => name,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            FailoverEvent::AttemptFailed { .. }
            | FailoverEvent::RetryScheduled { .. }
            | FailoverEvent::Escalated { .. } => Severity::Warn,
            FailoverEvent::FatalFailure { .. } | FailoverEvent::Exhausted { .. } => {
                Severity::Error
            }
            _ => Severity::Info,
        }
    }
}

impl FailoverEvent {
    /// Writes the event as a structured log record at its severity.
    pub(crate) fn log(&self) {
        let event = self.event_type();
        let source = self.source_name();
        match self {
            FailoverEvent::StrategySelected { strategy, mode, .. } => {
                tracing::info!(
                    event,
                    source,
                    strategy = %strategy,
                    mode = %mode,
                    "connecting to database"
                );
            }
            FailoverEvent::AttemptFailed {
                strategy,
                attempt,
                kind,
                error,
                code,
                ..
            } => {
                tracing::warn!(
                    event,
                    source,
                    strategy = %strategy,
                    attempt,
                    kind = %kind,
                    error = %error,
                    code = code.as_deref(),
                    "database connection attempt failed"
                );
            }
            FailoverEvent::RetryScheduled {
                strategy,
                attempt,
                delay,
                ..
            } => {
                tracing::warn!(
                    event,
                    source,
                    strategy = %strategy,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying database connection"
                );
            }
            FailoverEvent::Escalated { from, to, attempts, .. } => {
                tracing::warn!(
                    event,
                    source,
                    from = %from,
                    to = %to,
                    attempt = attempts,
                    "falling back to direct database connection"
                );
            }
            FailoverEvent::Connected {
                strategy,
                attempt,
                probes,
                ..
            } => {
                tracing::info!(
                    event,
                    source,
                    strategy = %strategy,
                    attempt,
                    probes,
                    "database connection established"
                );
            }
            FailoverEvent::FatalFailure {
                strategy,
                attempt,
                kind,
                error,
                code,
                ..
            } => {
                tracing::error!(
                    event,
                    source,
                    strategy = %strategy,
                    attempt,
                    kind = %kind,
                    error = %error,
                    code = code.as_deref(),
                    "database connection failed, not retrying"
                );
            }
            FailoverEvent::Exhausted {
                strategy,
                probes,
                error,
                ..
            } => {
                tracing::error!(
                    event,
                    source,
                    strategy = %strategy,
                    attempt = probes,
                    error = %error,
                    "database connection attempts exhausted"
                );
            }
            FailoverEvent::ShutDown { released, .. } => {
                tracing::info!(event, source, released, "database connection released");
            }
        }
    }
}
