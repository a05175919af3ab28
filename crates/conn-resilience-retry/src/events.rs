use conn_resilience_core::{ResilienceEvent, Severity};
use std::time::{Duration, Instant};

/// Events emitted by [`with_retry`](crate::with_retry).
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A transient failure occurred and the operation will be re-run.
    Retry {
        operation: String,
        timestamp: Instant,
        /// The attempt that failed (1-based).
        attempt: usize,
        delay: Duration,
        error: String,
    },
    /// The operation succeeded, on the first try or after retries.
    Success {
        operation: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The operation kept failing transiently until the budget ran out.
    Error {
        operation: String,
        timestamp: Instant,
        attempts: usize,
        error: String,
    },
    /// A non-transient failure was returned without retrying.
    IgnoredError {
        operation: String,
        timestamp: Instant,
        attempt: usize,
        error: String,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Error { .. } => "retries_exhausted",
            RetryEvent::IgnoredError { .. } => "ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Error { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn source_name(&self) -> &str {
        match self {
            RetryEvent::Retry { operation, .. }
            | RetryEvent::Success { operation, .. }
            | RetryEvent::Error { operation, .. }
            | RetryEvent::IgnoredError { operation, .. } => operation,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            RetryEvent::Retry { .. } => Severity::Warn,
            RetryEvent::Success { .. } | RetryEvent::IgnoredError { .. } => Severity::Info,
            RetryEvent::Error { .. } => Severity::Error,
        }
    }
}
