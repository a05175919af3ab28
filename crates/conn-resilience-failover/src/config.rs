use crate::env::Mode;
use crate::error::FailureKind;
use crate::events::FailoverEvent;
use crate::target::{StrategyKind, StrategySettings};
use conn_resilience_core::{EventListener, EventListeners, FnListener};
use conn_resilience_retry::{
    ExponentialBackoff, FixedInterval, IntervalFunction, LinearBackoff,
};
use std::sync::Arc;
use std::time::Duration;

/// Default probes per strategy.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Default base delay of the linear connection backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// When the scheduler may fall back from pooled to direct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscalationPolicy {
    /// Escalate in production only. Development targets are never pooled,
    /// so there is nothing to fall back from.
    #[default]
    ProductionOnly,
    /// Escalate in every mode.
    Always,
    /// Never escalate.
    Never,
}

impl EscalationPolicy {
    /// Returns `true` if escalation is enabled in `mode`.
    pub fn allows(self, mode: Mode) -> bool {
        match self {
            EscalationPolicy::ProductionOnly => mode.is_production(),
            EscalationPolicy::Always => true,
            EscalationPolicy::Never => false,
        }
    }
}

/// Configuration for the connection scheduler and facade.
pub struct FailoverConfig {
    pub(crate) name: String,
    pub(crate) max_attempts: usize,
    pub(crate) backoff: Arc<dyn IntervalFunction>,
    pub(crate) escalation: EscalationPolicy,
    pub(crate) settings: StrategySettings,
    pub(crate) probe_timeout: Option<Duration>,
    pub(crate) event_listeners: EventListeners<FailoverEvent>,
}

impl FailoverConfig {
    /// Creates a new builder.
    pub fn builder() -> FailoverConfigBuilder {
        FailoverConfigBuilder::new()
    }

    /// Name reported in events and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Probes allowed per strategy.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay before the probe following failed attempt `attempt`.
    pub fn next_backoff(&self, attempt: usize) -> Duration {
        self.backoff.next_interval(attempt)
    }

    pub fn escalation(&self) -> EscalationPolicy {
        self.escalation
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout
    }

    pub(crate) fn emit(&self, event: FailoverEvent) {
        event.log();
        self.event_listeners.emit(&event);
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        FailoverConfigBuilder::new().build()
    }
}

impl Clone for FailoverConfig {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_attempts: self.max_attempts,
            backoff: Arc::clone(&self.backoff),
            escalation: self.escalation,
            settings: self.settings.clone(),
            probe_timeout: self.probe_timeout,
            event_listeners: self.event_listeners.clone(),
        }
    }
}

impl std::fmt::Debug for FailoverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverConfig")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("escalation", &self.escalation)
            .field("settings", &self.settings)
            .field("probe_timeout", &self.probe_timeout)
            .field("event_listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Builder for [`FailoverConfig`].
pub struct FailoverConfigBuilder {
    name: String,
    max_attempts: usize,
    backoff: Option<Arc<dyn IntervalFunction>>,
    escalation: EscalationPolicy,
    settings: StrategySettings,
    probe_timeout: Option<Duration>,
    event_listeners: EventListeners<FailoverEvent>,
}

impl Default for FailoverConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FailoverConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - name: `database`
    /// - max_attempts: 3 per strategy
    /// - backoff: linear, five seconds per attempt
    /// - escalation: production only
    /// - probe_timeout: none (bounded by the driver's connect timeout)
    pub fn new() -> Self {
        Self {
            name: "database".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: None,
            escalation: EscalationPolicy::default(),
            settings: StrategySettings::default(),
            probe_timeout: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the name used in events and logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the probes allowed per strategy. Values below 1 are treated as 1.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets a linear backoff of `base_delay * attempt`.
    pub fn base_delay(self, base_delay: Duration) -> Self {
        self.backoff(LinearBackoff::new(base_delay))
    }

    /// Sets a fixed delay between probes.
    pub fn fixed_backoff(self, delay: Duration) -> Self {
        self.backoff(FixedInterval::new(delay))
    }

    /// Sets exponential backoff doubling from `initial_interval`.
    pub fn exponential_backoff(self, initial_interval: Duration) -> Self {
        self.backoff(ExponentialBackoff::new(initial_interval))
    }

    /// Sets a custom backoff.
    ///
    /// # Examples
    ///
    /// ```
    /// use conn_resilience_failover::FailoverConfig;
    /// use conn_resilience_retry::FnInterval;
    /// use std::time::Duration;
    ///
    /// let config = FailoverConfig::builder()
    ///     .backoff(FnInterval::new(|attempt| Duration::from_millis(250 * attempt as u64)))
    ///     .build();
    /// assert_eq!(config.next_backoff(2), Duration::from_millis(500));
    /// ```
    pub fn backoff<I>(mut self, interval_fn: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.backoff = Some(Arc::new(interval_fn));
        self
    }

    /// Sets when pooled-to-direct escalation is allowed.
    pub fn escalation(mut self, escalation: EscalationPolicy) -> Self {
        self.escalation = escalation;
        self
    }

    /// Sets ports, limits and timeouts for production targets.
    pub fn settings(mut self, settings: StrategySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Bounds each probe. An expired probe fails as a timeout.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Registers an event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<FailoverEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback receiving every event.
    pub fn on_event<F>(self, f: F) -> Self
    where
        F: Fn(&FailoverEvent) + Send + Sync + 'static,
    {
        self.listener(FnListener::new(f))
    }

    /// Registers a callback for retryable probe failures.
    pub fn on_attempt_failed<F>(self, f: F) -> Self
    where
        F: Fn(StrategyKind, usize, FailureKind) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let FailoverEvent::AttemptFailed {
                strategy,
                attempt,
                kind,
                ..
            } = event
            {
                f(*strategy, *attempt, *kind);
            }
        })
    }

    /// Registers a callback invoked before each backoff sleep.
    pub fn on_retry<F>(self, f: F) -> Self
    where
        F: Fn(StrategyKind, usize, Duration) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let FailoverEvent::RetryScheduled {
                strategy,
                attempt,
                delay,
                ..
            } = event
            {
                f(*strategy, *attempt, *delay);
            }
        })
    }

    /// Registers a callback invoked on pooled-to-direct escalation with the
    /// number of pooled attempts spent.
    pub fn on_escalation<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let FailoverEvent::Escalated { attempts, .. } = event {
                f(*attempts);
            }
        })
    }

    /// Registers a callback invoked when a connection is established.
    pub fn on_connected<F>(self, f: F) -> Self
    where
        F: Fn(StrategyKind, usize) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let FailoverEvent::Connected {
                strategy, probes, ..
            } = event
            {
                f(*strategy, *probes);
            }
        })
    }

    /// Registers a callback invoked when a session ends without a
    /// connection, for any reason.
    pub fn on_exhausted<F>(self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_event(move |event| match event {
            FailoverEvent::Exhausted { probes, .. } => f(*probes),
            FailoverEvent::FatalFailure { attempt, .. } => f(*attempt),
            _ => {}
        })
    }

    /// Builds the configuration.
    pub fn build(self) -> FailoverConfig {
        FailoverConfig {
            name: self.name,
            max_attempts: self.max_attempts,
            backoff: self
                .backoff
                .unwrap_or_else(|| Arc::new(LinearBackoff::new(DEFAULT_RETRY_DELAY))),
            escalation: self.escalation,
            settings: self.settings,
            probe_timeout: self.probe_timeout,
            event_listeners: self.event_listeners,
        }
    }
}
