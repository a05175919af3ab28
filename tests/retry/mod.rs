//! Retry wrapper tests.
//!
//! Test organization:
//! - behavior.rs: Invocation counts and error propagation
//! - backoff.rs: Delay schedules
//! - events.rs: Callbacks and events
//! - transient.rs: Pool exhaustion as the transient class

mod backoff;
mod transient;

use conn_resilience_retry::TransientError;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QueryError {
    PoolTimedOut(usize),
    Constraint,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::PoolTimedOut(n) => write!(f, "pool timed out (call {})", n),
            QueryError::Constraint => write!(f, "unique constraint violated"),
        }
    }
}

impl TransientError for QueryError {
    fn is_transient(&self) -> bool {
        is_pool_timeout(self)
    }
}

pub(crate) fn is_pool_timeout(error: &QueryError) -> bool {
    matches!(error, QueryError::PoolTimedOut(_))
}

/// Operation failing with a pool timeout for its first `failures` calls.
pub(crate) fn flaky(
    calls: &Arc<AtomicUsize>,
    failures: usize,
) -> impl FnMut() -> futures::future::Ready<Result<usize, QueryError>> + use<> {
    let calls = Arc::clone(calls);
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        futures::future::ready(if n <= failures {
            Err(QueryError::PoolTimedOut(n))
        } else {
            Ok(n)
        })
    }
}
