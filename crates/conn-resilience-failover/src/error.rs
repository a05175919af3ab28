//! Error taxonomy for connection establishment.
//!
//! Failures are classified once, at the probe, into a [`FailureKind`]. The
//! kind alone decides whether the scheduler retries: timeouts and
//! unreachable endpoints are retried, rejected credentials and unknown
//! failures are not.

use crate::env::Mode;
use crate::target::StrategyKind;
use conn_resilience_retry::TransientError;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// HTTP status the request boundary uses for every connection error.
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Body shown to clients in production instead of the error detail.
pub const PUBLIC_UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable";

/// The connection string is missing or cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// `DATABASE_URL` is unset or empty.
    #[error("DATABASE_URL environment variable is not set")]
    MissingConnectionString,

    /// `DATABASE_URL` does not parse as a URL.
    #[error("DATABASE_URL is not a valid URL: {0}")]
    Malformed(String),

    /// The URL parsed but names no host.
    #[error("DATABASE_URL has no host")]
    MissingHost,

    /// The URL scheme is not a PostgreSQL scheme.
    #[error("unsupported connection scheme `{0}` (expected postgres or postgresql)")]
    UnsupportedScheme(String),
}

/// Classification of a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The connect or liveness query did not finish in time.
    Timeout,
    /// The server rejected the credentials.
    AuthenticationFailure,
    /// The endpoint could not be reached or refused the connection.
    NetworkUnreachable,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Returns `true` if another attempt may succeed.
    ///
    /// Authentication failures cannot resolve on their own and repeated
    /// attempts may lock the account out. Unknown failures are not retried
    /// so they are not hidden behind silent retries.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::NetworkUnreachable)
    }

    /// Returns the kind as it appears in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::AuthenticationFailure => "authentication_failure",
            FailureKind::NetworkUnreachable => "network_unreachable",
            FailureKind::Other => "other",
        }
    }

    /// Best-effort classification from an error message, for transports
    /// that only report text.
    pub fn from_message(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if message.contains("timed out") || message.contains("timeout") {
            FailureKind::Timeout
        } else if message.contains("password authentication failed")
            || message.contains("authentication failed")
            || message.contains("no pg_hba.conf entry")
        {
            FailureKind::AuthenticationFailure
        } else if message.contains("connection refused")
            || message.contains("could not connect")
            || message.contains("can't reach")
            || message.contains("unreachable")
            || message.contains("no route to host")
            || message.contains("connection reset")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
        {
            FailureKind::NetworkUnreachable
        } else {
            FailureKind::Other
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified connection failure, as produced by a probe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ConnectFailure {
    kind: FailureKind,
    message: String,
    code: Option<String>,
}

impl ConnectFailure {
    /// Creates a failure of the given kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Classifies a failure from its message alone.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(FailureKind::from_message(&message), message)
    }

    /// Attaches a driver error code (e.g. a SQLSTATE).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// The failure classification.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// The transport's error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The driver error code, when the transport reported one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Shorthand for `self.kind().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Terminal outcome of a failed connection session.
///
/// Every variant means the database is unavailable; callers serving
/// non-database requests keep running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The connection string is missing or malformed. No attempt was made.
    #[error("invalid database configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The server rejected the credentials. Not retried.
    #[error("database authentication failed: {0}")]
    Authentication(ConnectFailure),

    /// An unclassified failure. Not retried.
    #[error("database connection failed: {0}")]
    Fatal(ConnectFailure),

    /// Every allowed attempt failed with a retryable error.
    #[error("database unreachable after {attempts} attempts (last strategy: {strategy}): {last}")]
    Exhausted {
        /// Probes made across all strategies.
        attempts: usize,
        /// Strategy of the final attempt.
        strategy: StrategyKind,
        /// The final failure.
        last: ConnectFailure,
    },

    /// The connection pool had no free connection. Raised by operations,
    /// never by connection establishment, and retried by
    /// [`with_retry`](conn_resilience_retry::with_retry).
    #[error("timed out fetching a new connection from the connection pool: {0}")]
    PoolExhausted(String),

    /// The session was abandoned because the layer was shut down.
    #[error("database connection layer has been shut down")]
    ShutDown,
}

impl ConnectionError {
    /// Builds the terminal error for a non-retryable probe failure.
    pub fn from_fatal(failure: ConnectFailure) -> Self {
        match failure.kind() {
            FailureKind::AuthenticationFailure => ConnectionError::Authentication(failure),
            _ => ConnectionError::Fatal(failure),
        }
    }

    /// Returns the classified probe failure behind this error, if any.
    pub fn failure(&self) -> Option<&ConnectFailure> {
        match self {
            ConnectionError::Authentication(f) | ConnectionError::Fatal(f) => Some(f),
            ConnectionError::Exhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// Returns the driver error code, when available.
    pub fn code(&self) -> Option<&str> {
        self.failure().and_then(ConnectFailure::code)
    }

    /// Returns `true` for configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ConnectionError::Configuration(_))
    }

    /// HTTP status for the request boundary.
    pub fn status_code(&self) -> u16 {
        SERVICE_UNAVAILABLE
    }

    /// Message safe to show a client: generic in production, the error
    /// detail otherwise.
    pub fn public_message(&self, mode: Mode) -> Cow<'static, str> {
        if mode.is_production() {
            Cow::Borrowed(PUBLIC_UNAVAILABLE_MESSAGE)
        } else {
            Cow::Owned(self.to_string())
        }
    }
}

impl TransientError for ConnectionError {
    fn is_transient(&self) -> bool {
        matches!(self, ConnectionError::PoolExhausted(_))
    }
}
