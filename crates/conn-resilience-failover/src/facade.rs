//! Process-lifetime owner of the database connection.

use crate::config::FailoverConfig;
use crate::env::{EnvironmentContext, Mode};
use crate::error::ConnectionError;
use crate::events::FailoverEvent;
use crate::probe::Connector;
use crate::scheduler::{run_session, Established};
use crate::state::{SessionState, SessionTracker};
use crate::target::StrategyKind;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

type SessionFuture = Shared<BoxFuture<'static, Result<(), ConnectionError>>>;

enum Slot<H> {
    Empty,
    Connecting(SessionFuture),
    Ready {
        handle: Arc<H>,
        strategy: StrategyKind,
    },
}

struct Inner<C: Connector> {
    connector: C,
    env: EnvironmentContext,
    config: FailoverConfig,
    tracker: SessionTracker,
    slot: Mutex<Slot<C::Connection>>,
    /// Bumped by shutdown and reconnect. A session that finishes under an
    /// older generation does not install its handle.
    generation: AtomicU64,
}

/// Owns the active connection and hands it out on demand.
///
/// At most one connection session runs at a time: concurrent callers of
/// [`ensure_ready`](Self::ensure_ready) while a session is in flight all
/// await that session. Cloning is cheap and clones share everything.
///
/// # Examples
///
/// ```no_run
/// use conn_resilience_failover::{EnvironmentContext, Failover, FailoverConfig, PgConnector};
///
/// # async fn example() {
/// let db = Failover::new(
///     PgConnector::default(),
///     EnvironmentContext::from_env(),
///     FailoverConfig::default(),
/// );
///
/// if let Err(e) = db.ensure_ready().await {
///     eprintln!("{} {}", e.status_code(), e.public_message(db.mode()));
/// }
///
/// if let Some(pool) = db.handle() {
///     let _one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&*pool).await.unwrap();
/// }
///
/// db.shutdown().await;
/// # }
/// ```
pub struct Failover<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for Failover<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> Failover<C> {
    pub fn new(connector: C, env: EnvironmentContext, config: FailoverConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                env,
                config,
                tracker: SessionTracker::new(),
                slot: Mutex::new(Slot::Empty),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a facade over the process environment.
    pub fn from_env(connector: C, config: FailoverConfig) -> Self {
        Self::new(connector, EnvironmentContext::from_env(), config)
    }

    /// Makes sure a connection is established.
    ///
    /// Returns at once when a connection is already installed. Otherwise
    /// joins the in-flight session or starts a new one. After a failed
    /// session the next call starts over from the pooled strategy.
    pub async fn ensure_ready(&self) -> Result<(), ConnectionError> {
        let session = {
            let mut slot = self.inner.slot.lock();
            match &*slot {
                Slot::Ready { .. } => return Ok(()),
                Slot::Connecting(session) => session.clone(),
                Slot::Empty => {
                    let session = self.start_session();
                    *slot = Slot::Connecting(session.clone());
                    session
                }
            }
        };
        session.await
    }

    /// Returns `true` if a connection is, or can be, established.
    pub async fn test_connection(&self) -> bool {
        self.ensure_ready().await.is_ok()
    }

    /// Releases the current connection, if any, and establishes a new one.
    ///
    /// A session already in flight is joined instead.
    pub async fn reconnect(&self) -> Result<(), ConnectionError> {
        let (stale, session) = {
            let mut slot = self.inner.slot.lock();
            if let Slot::Connecting(session) = &*slot {
                (None, session.clone())
            } else {
                self.inner.generation.fetch_add(1, Ordering::AcqRel);
                let session = self.start_session();
                let previous = std::mem::replace(&mut *slot, Slot::Connecting(session.clone()));
                let stale = match previous {
                    Slot::Ready { handle, .. } => Some(handle),
                    _ => None,
                };
                (stale, session)
            }
        };

        if let Some(handle) = stale {
            tracing::debug!(source = self.inner.config.name(), "closing stale connection");
            self.inner.connector.close(&handle).await;
        }
        session.await
    }

    /// Releases the active connection.
    ///
    /// Safe to call repeatedly and before any connection existed. Does not
    /// wait for an in-flight session; a session finishing afterwards closes
    /// its connection instead of installing it.
    pub async fn shutdown(&self) {
        let previous = {
            let mut slot = self.inner.slot.lock();
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            std::mem::replace(&mut *slot, Slot::Empty)
        };
        self.inner.tracker.transition(SessionState::Idle);

        let released = match previous {
            Slot::Ready { handle, .. } => {
                self.inner.connector.close(&handle).await;
                true
            }
            Slot::Connecting(_) | Slot::Empty => false,
        };

        self.inner.config.emit(FailoverEvent::ShutDown {
            name: self.inner.config.name().to_string(),
            timestamp: Instant::now(),
            released,
        });
    }

    /// Waits for Ctrl-C (or SIGTERM on unix), then shuts down.
    pub async fn shutdown_on_signal(&self) -> std::io::Result<()> {
        wait_for_termination().await?;
        tracing::info!(
            source = self.inner.config.name(),
            "termination signal received, closing database connection"
        );
        self.shutdown().await;
        Ok(())
    }

    /// The active connection, shared with the facade.
    ///
    /// The facade stays the owner: it closes the connection on reconnect and
    /// shutdown even while clones are still held.
    pub fn handle(&self) -> Option<Arc<C::Connection>> {
        match &*self.inner.slot.lock() {
            Slot::Ready { handle, .. } => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Strategy of the active connection.
    pub fn active_strategy(&self) -> Option<StrategyKind> {
        match &*self.inner.slot.lock() {
            Slot::Ready { strategy, .. } => Some(*strategy),
            _ => None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.inner.tracker.state()
    }

    /// Probe, escalation and session counters.
    pub fn tracker(&self) -> &SessionTracker {
        &self.inner.tracker
    }

    pub fn mode(&self) -> Mode {
        self.inner.env.mode()
    }

    pub fn environment(&self) -> &EnvironmentContext {
        &self.inner.env
    }

    pub fn config(&self) -> &FailoverConfig {
        &self.inner.config
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    fn start_session(&self) -> SessionFuture {
        let inner = Arc::clone(&self.inner);
        let generation = inner.generation.load(Ordering::Acquire);
        async move { inner.session(generation).await }
            .boxed()
            .shared()
    }
}

impl<C: Connector> Inner<C> {
    async fn session(self: Arc<Self>, generation: u64) -> Result<(), ConnectionError> {
        let result = run_session(&self.connector, &self.env, &self.config, &self.tracker).await;

        let orphan = {
            let mut slot = self.slot.lock();
            let current = self.generation.load(Ordering::Acquire) == generation;
            match result {
                Ok(Established {
                    handle, strategy, ..
                }) if current => {
                    *slot = Slot::Ready {
                        handle: Arc::new(handle),
                        strategy,
                    };
                    self.tracker.transition(SessionState::Ready);
                    return Ok(());
                }
                Ok(Established { handle, .. }) => handle,
                Err(error) => {
                    if current {
                        *slot = Slot::Empty;
                    } else {
                        self.tracker.transition(SessionState::Idle);
                    }
                    return Err(error);
                }
            }
        };

        tracing::info!(
            source = self.config.name(),
            "connection established after shutdown, closing it"
        );
        self.connector.close(&orphan).await;
        self.tracker.transition(SessionState::Idle);
        Err(ConnectionError::ShutDown)
    }
}

impl<C: Connector> fmt::Debug for Failover<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failover")
            .field("name", &self.inner.config.name())
            .field("mode", &self.inner.env.mode())
            .field("state", &self.state())
            .field("active_strategy", &self.active_strategy())
            .finish()
    }
}

async fn wait_for_termination() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
