//! Session state tracking for the connection scheduler.

use crate::target::StrategyKind;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Where a connection session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has run, or the layer was shut down.
    Idle,
    /// A probe for `attempt` (1-based) on `strategy` is in flight or
    /// scheduled.
    Attempting {
        strategy: StrategyKind,
        attempt: usize,
    },
    /// Pooled attempts ran out; switching to direct.
    Escalated,
    /// The last session failed. Terminal until the next call.
    Exhausted,
    /// A connection is established. Terminal until shutdown.
    Ready,
}

impl SessionState {
    /// Returns `true` for [`SessionState::Exhausted`] and
    /// [`SessionState::Ready`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Exhausted | SessionState::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Attempting { strategy, attempt } => {
                write!(f, "attempting({}, {})", strategy, attempt)
            }
            SessionState::Escalated => f.write_str("escalated"),
            SessionState::Exhausted => f.write_str("exhausted"),
            SessionState::Ready => f.write_str("ready"),
        }
    }
}

/// Shared state and lifetime counters for a facade and its sessions.
#[derive(Clone)]
pub struct SessionTracker {
    state: Arc<Mutex<SessionState>>,
    probes: Arc<AtomicUsize>,
    escalations: Arc<AtomicUsize>,
    sessions: Arc<AtomicUsize>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
            probes: Arc::new(AtomicUsize::new(0)),
            escalations: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Replaces the state, returning the previous one.
    pub fn transition(&self, next: SessionState) -> SessionState {
        let mut state = self.state.lock();
        let previous = *state;
        *state = next;
        if previous != next {
            tracing::trace!(from = %previous, to = %next, "session state changed");
        }
        previous
    }

    /// Probes run since creation.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::Acquire)
    }

    /// Pooled-to-direct escalations since creation.
    pub fn escalations(&self) -> usize {
        self.escalations.load(Ordering::Acquire)
    }

    /// Sessions started since creation.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Acquire)
    }

    pub(crate) fn record_probe(&self) {
        self.probes.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_escalation(&self) {
        self.escalations.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTracker")
            .field("state", &self.state())
            .field("probes", &self.probes())
            .field("escalations", &self.escalations())
            .field("sessions", &self.sessions())
            .finish()
    }
}
