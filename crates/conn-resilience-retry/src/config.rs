use crate::backoff::{ExponentialBackoff, FixedInterval, IntervalFunction, LinearBackoff};
use crate::events::RetryEvent;
use crate::policy::{RetryPolicy, RetryPredicate, TransientError};
use conn_resilience_core::{EventListener, EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Default attempt budget, including the first attempt.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Default base delay for the linear backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Configuration for [`with_retry`](crate::with_retry).
///
/// A config holds no per-call state and can be shared between any number of
/// concurrent `with_retry` calls.
pub struct RetryConfig<E> {
    pub(crate) policy: RetryPolicy<E>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl<E> RetryConfig<E> {
    /// Creates a builder retrying only errors accepted by `predicate`.
    ///
    /// Use this for error types that do not implement [`TransientError`].
    pub fn retry_on<F>(predicate: F) -> RetryConfigBuilder<E>
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        RetryConfigBuilder::with_predicate(Arc::new(predicate))
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }
}

impl<E: TransientError + 'static> RetryConfig<E> {
    /// Creates a new builder retrying [`TransientError::is_transient`]
    /// failures unless [`retry_on`](RetryConfigBuilder::retry_on) replaces
    /// the predicate.
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }

    /// Default config retrying only [`TransientError::is_transient`] failures:
    /// three attempts with a linear one-second backoff.
    pub fn transient() -> Self {
        RetryConfigBuilder::new().build()
    }
}

impl<E: TransientError + 'static> Default for RetryConfig<E> {
    fn default() -> Self {
        Self::transient()
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            event_listeners: self.event_listeners.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("policy", &self.policy)
            .field("event_listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder<E> {
    max_attempts: usize,
    interval_fn: Option<Arc<dyn IntervalFunction>>,
    retry_predicate: RetryPredicate<E>,
    event_listeners: EventListeners<RetryEvent>,
}

impl<E: TransientError + 'static> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: TransientError + 'static> RetryConfigBuilder<E> {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - backoff: linear, one second per attempt
    /// - predicate: [`TransientError::is_transient`]
    pub fn new() -> Self {
        Self::with_predicate(Arc::new(|error: &E| error.is_transient()))
    }

    /// Retries only errors reporting [`TransientError::is_transient`].
    pub fn retry_transient(self) -> Self {
        self.retry_on(|error: &E| error.is_transient())
    }
}

impl<E> RetryConfigBuilder<E> {
    fn with_predicate(retry_predicate: RetryPredicate<E>) -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval_fn: None,
            retry_predicate,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the maximum number of attempts, including the first.
    ///
    /// Values below 1 are treated as 1.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets a linear backoff of `base_delay * attempt`.
    pub fn base_delay(self, base_delay: Duration) -> Self {
        self.linear_backoff(base_delay)
    }

    /// Sets a linear backoff of `base * attempt`.
    pub fn linear_backoff(mut self, base: Duration) -> Self {
        self.interval_fn = Some(Arc::new(LinearBackoff::new(base)));
        self
    }

    /// Sets a fixed backoff interval.
    pub fn fixed_backoff(mut self, duration: Duration) -> Self {
        self.interval_fn = Some(Arc::new(FixedInterval::new(duration)));
        self
    }

    /// Sets exponential backoff doubling from `initial_interval`.
    pub fn exponential_backoff(mut self, initial_interval: Duration) -> Self {
        self.interval_fn = Some(Arc::new(ExponentialBackoff::new(initial_interval)));
        self
    }

    /// Sets a custom interval function for backoff.
    pub fn backoff<I>(mut self, interval_fn: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.interval_fn = Some(Arc::new(interval_fn));
        self
    }

    /// Sets a predicate selecting which errors are retried.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Arc::new(predicate);
        self
    }

    /// Registers an event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RetryEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback receiving every event.
    pub fn on_event<F>(self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.listener(FnListener::new(f))
    }

    /// Registers a callback invoked before each retry.
    ///
    /// Receives the attempt that failed (1-based) and the delay before the
    /// next one.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback invoked on success with the total attempt count.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when the attempt budget is exhausted.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Error { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when a non-retryable error is returned
    /// without retrying.
    pub fn on_ignored_error<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, RetryEvent::IgnoredError { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RetryConfig<E> {
        let interval_fn = self
            .interval_fn
            .unwrap_or_else(|| Arc::new(LinearBackoff::new(DEFAULT_BASE_DELAY)));

        let mut policy = RetryPolicy::new(self.max_attempts, interval_fn);
        policy.retry_predicate = Some(self.retry_predicate);

        RetryConfig {
            policy,
            event_listeners: self.event_listeners,
        }
    }
}
