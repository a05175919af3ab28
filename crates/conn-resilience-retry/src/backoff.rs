use std::time::Duration;

/// Abstraction for computing retry intervals.
///
/// Implementations are indexed by the attempt that just failed, starting at
/// 1, so `next_interval(1)` is the delay between the first and second
/// attempt.
pub trait IntervalFunction: Send + Sync {
    /// Computes the delay before the attempt following `attempt`.
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// Fixed interval backoff - returns the same duration for every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    /// Creates a new fixed interval backoff.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.duration
    }
}

/// Linear backoff: `base * attempt`, optionally capped.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    max_interval: Option<Duration>,
}

impl LinearBackoff {
    /// Creates a linear backoff growing by `base` per attempt.
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max_interval: None,
        }
    }

    /// Caps the computed interval.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }
}

impl IntervalFunction for LinearBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt.max(1)).unwrap_or(u32::MAX);
        let interval = self.base.saturating_mul(factor);
        match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        }
    }
}

/// Exponential backoff: `initial * multiplier^(attempt - 1)`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
}

impl ExponentialBackoff {
    /// Creates a new exponential backoff with default multiplier of 2.0.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: None,
        }
    }

    /// Sets the multiplier for exponential growth.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the maximum interval to cap exponential growth.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    fn raw_interval(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let interval = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        }
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        self.raw_interval(attempt)
    }
}

/// Exponential backoff with jitter, so that many clients reconnecting to the
/// same endpoint spread out instead of arriving together.
#[derive(Debug, Clone)]
pub struct ExponentialRandomBackoff {
    inner: ExponentialBackoff,
    randomization_factor: f64,
}

impl ExponentialRandomBackoff {
    /// Creates a new exponential random backoff.
    ///
    /// A `randomization_factor` of 0.5 spreads each interval between 50% and
    /// 150% of the exponential value. The factor is clamped to `0.0..=1.0`.
    pub fn new(initial_interval: Duration, randomization_factor: f64) -> Self {
        Self {
            inner: ExponentialBackoff::new(initial_interval),
            randomization_factor: randomization_factor.clamp(0.0, 1.0),
        }
    }

    /// Sets the multiplier for exponential growth.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.inner = self.inner.multiplier(multiplier);
        self
    }

    /// Sets the maximum interval applied before jitter.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.inner = self.inner.max_interval(max_interval);
        self
    }

    fn randomize(&self, duration: Duration) -> Duration {
        use rand::Rng;
        let secs = duration.as_secs_f64();
        let delta = secs * self.randomization_factor;
        if delta == 0.0 {
            return duration;
        }
        let randomized = rand::rng().random_range((secs - delta)..=(secs + delta));
        Duration::try_from_secs_f64(randomized.max(0.0)).unwrap_or(duration)
    }
}

impl IntervalFunction for ExponentialRandomBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        self.randomize(self.inner.raw_interval(attempt))
    }
}

/// Function-based interval implementation.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    /// Creates a new function-based interval.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}

impl<F> std::fmt::Debug for FnInterval<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnInterval")
    }
}
