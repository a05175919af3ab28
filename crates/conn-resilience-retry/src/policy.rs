use crate::backoff::IntervalFunction;
use std::sync::Arc;
use std::time::Duration;

/// Determines whether an error belongs to the retryable class.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Marks error types that know whether they are transient.
///
/// A transient error is one that may succeed if the operation is re-run
/// unchanged, such as an exhausted connection pool. Everything else is
/// returned to the caller on first occurrence.
pub trait TransientError {
    /// Returns `true` if retrying may succeed.
    fn is_transient(&self) -> bool;
}

impl TransientError for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self.kind(),
            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
        )
    }
}

/// Policy for retry behavior.
///
/// Combines the attempt budget, the backoff function and the predicate that
/// selects which errors are retried.
pub struct RetryPolicy<E> {
    pub(crate) max_attempts: usize,
    pub(crate) interval_fn: Arc<dyn IntervalFunction>,
    pub(crate) retry_predicate: Option<RetryPredicate<E>>,
}

impl<E> RetryPolicy<E> {
    /// Creates a new retry policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: usize, interval_fn: Arc<dyn IntervalFunction>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval_fn,
            retry_predicate: None,
        }
    }

    /// Sets a predicate to determine which errors should be retried.
    pub fn with_retry_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Checks if the given error should be retried.
    ///
    /// Without a predicate no error is retried.
    pub fn should_retry(&self, error: &E) -> bool {
        match &self.retry_predicate {
            Some(predicate) => predicate(error),
            None => false,
        }
    }

    /// Computes the delay after the failed `attempt` (1-based).
    pub fn next_backoff(&self, attempt: usize) -> Duration {
        self.interval_fn.next_interval(attempt)
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            interval_fn: Arc::clone(&self.interval_fn),
            retry_predicate: self.retry_predicate.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("retry_predicate", &self.retry_predicate.is_some())
            .finish()
    }
}
