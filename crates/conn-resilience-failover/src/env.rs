//! Process environment, read once at startup.

use crate::error::ConfigurationError;
use std::fmt;

/// Environment variable holding the connection string.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Environment variable selecting the deployment mode.
pub const MODE_VAR: &str = "APP_ENV";

/// Consulted when [`MODE_VAR`] is unset.
pub const FALLBACK_MODE_VAR: &str = "NODE_ENV";

/// Deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Local development: connect to the URL as given, no pooling, no SSL.
    #[default]
    Development,
    /// Production: pooled endpoint first, direct endpoint as fallback, SSL.
    Production,
}

impl Mode {
    /// Parses a mode flag. Only `production` (case-insensitive) selects
    /// [`Mode::Production`]; anything else, including an empty value, is
    /// treated as development.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Mode::Production
        } else {
            Mode::Development
        }
    }

    /// Returns `true` for [`Mode::Production`].
    pub fn is_production(self) -> bool {
        self == Mode::Production
    }

    /// Returns the mode name as it appears in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view of the configuration the connection layer needs.
///
/// A missing connection string is not rejected here; it is reported as a
/// [`ConfigurationError`] by [`validate`](Self::validate) and by every
/// connection attempt, before any network I/O.
#[derive(Clone, PartialEq, Eq)]
pub struct EnvironmentContext {
    mode: Mode,
    raw_connection_string: Option<String>,
}

impl EnvironmentContext {
    /// Creates a context from explicit values.
    pub fn new(mode: Mode, raw_connection_string: Option<String>) -> Self {
        Self {
            mode,
            raw_connection_string: raw_connection_string.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Shorthand for a production context.
    pub fn production(url: impl Into<String>) -> Self {
        Self::new(Mode::Production, Some(url.into()))
    }

    /// Shorthand for a development context.
    pub fn development(url: impl Into<String>) -> Self {
        Self::new(Mode::Development, Some(url.into()))
    }

    /// Reads `DATABASE_URL` and `APP_ENV` (falling back to `NODE_ENV`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a context from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = lookup(MODE_VAR)
            .or_else(|| lookup(FALLBACK_MODE_VAR))
            .map(|value| Mode::parse(&value))
            .unwrap_or_default();
        Self::new(mode, lookup(DATABASE_URL_VAR))
    }

    /// The deployment mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The connection string exactly as configured.
    pub fn raw_connection_string(&self) -> Option<&str> {
        self.raw_connection_string.as_deref()
    }

    /// Fails fast on a missing or unparseable connection string.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        crate::target::parse_connection_string(self).map(|_| ())
    }
}

impl fmt::Debug for EnvironmentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentContext")
            .field("mode", &self.mode)
            .field(
                "raw_connection_string",
                &self.raw_connection_string.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
