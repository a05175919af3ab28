//! URL strategy builder.
//!
//! Turns the configured connection string into a [`ConnectionTarget`] for a
//! given [`StrategyKind`]. Building is pure: it parses, rewrites port and
//! query parameters, and never touches the network.

use crate::env::{EnvironmentContext, Mode};
use crate::error::ConfigurationError;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Port used when the connection string does not name one.
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Query parameters owned by the builder in production. They are removed
/// before a strategy's own values are applied, so rebuilding a target from
/// an already-rewritten URL yields the same result.
const MANAGED_PARAMS: &[&str] = &[
    "pgbouncer",
    "sslmode",
    "schema",
    "connection_limit",
    "pool_timeout",
    "connect_timeout",
];

/// How the database is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Through the connection pooler (pgbouncer) on its multiplexing port.
    Pooled,
    /// Straight to the database server on its dedicated port.
    Direct,
}

impl StrategyKind {
    /// Returns the strategy name as it appears in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Pooled => "pooled",
            StrategyKind::Direct => "direct",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ports, limits and timeouts applied to production targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategySettings {
    pub(crate) pooled_port: u16,
    pub(crate) direct_port: u16,
    pub(crate) connection_limit: u32,
    pub(crate) pool_timeout: Duration,
    pub(crate) pooled_connect_timeout: Duration,
    pub(crate) direct_connect_timeout: Duration,
    pub(crate) schema: String,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            pooled_port: 6543,
            direct_port: DEFAULT_POSTGRES_PORT,
            connection_limit: 5,
            pool_timeout: Duration::from_secs(20),
            pooled_connect_timeout: Duration::from_secs(10),
            direct_connect_timeout: Duration::from_secs(60),
            schema: "public".to_string(),
        }
    }
}

impl StrategySettings {
    /// Creates a builder starting from the defaults.
    pub fn builder() -> StrategySettingsBuilder {
        StrategySettingsBuilder::default()
    }

    /// Port of the connection pooler.
    pub fn pooled_port(&self) -> u16 {
        self.pooled_port
    }

    /// Port of the database server.
    pub fn direct_port(&self) -> u16 {
        self.direct_port
    }

    /// Connections the pooled strategy may open.
    pub fn connection_limit(&self) -> u32 {
        self.connection_limit
    }

    /// How long a pooled client waits for a free connection.
    pub fn pool_timeout(&self) -> Duration {
        self.pool_timeout
    }

    /// Connect timeout for the given strategy.
    pub fn connect_timeout(&self, strategy: StrategyKind) -> Duration {
        match strategy {
            StrategyKind::Pooled => self.pooled_connect_timeout,
            StrategyKind::Direct => self.direct_connect_timeout,
        }
    }

    /// Schema applied to production targets.
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

/// Builder for [`StrategySettings`].
///
/// Defaults:
/// - pooled port: 6543, direct port: 5432
/// - connection limit: 5
/// - pool timeout: 20s
/// - connect timeout: 10s pooled, 60s direct
/// - schema: `public`
#[derive(Debug, Clone, Default)]
pub struct StrategySettingsBuilder {
    settings: StrategySettings,
}

impl StrategySettingsBuilder {
    /// Sets the pooler port.
    pub fn pooled_port(mut self, port: u16) -> Self {
        self.settings.pooled_port = port;
        self
    }

    /// Sets the database server port.
    pub fn direct_port(mut self, port: u16) -> Self {
        self.settings.direct_port = port;
        self
    }

    /// Sets the pooled connection limit.
    pub fn connection_limit(mut self, limit: u32) -> Self {
        self.settings.connection_limit = limit;
        self
    }

    /// Sets the pool timeout. Rendered in whole seconds.
    pub fn pool_timeout(mut self, timeout: Duration) -> Self {
        self.settings.pool_timeout = timeout;
        self
    }

    /// Sets the pooled connect timeout. Rendered in whole seconds.
    pub fn pooled_connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.pooled_connect_timeout = timeout;
        self
    }

    /// Sets the direct connect timeout. Rendered in whole seconds.
    pub fn direct_connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.direct_connect_timeout = timeout;
        self
    }

    /// Sets the schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.settings.schema = schema.into();
        self
    }

    /// Builds the settings.
    pub fn build(self) -> StrategySettings {
        self.settings
    }
}

/// A fully resolved place to connect to.
///
/// Built fresh for every attempt and never modified afterwards. The
/// `Display` impl masks the password and is what gets logged.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    url: Url,
    strategy: StrategyKind,
    mode: Mode,
    host: String,
    port: u16,
    username: String,
    password: Option<String>,
    database: Option<String>,
    ssl_required: bool,
    pooling: bool,
    params: BTreeMap<String, String>,
}

impl ConnectionTarget {
    /// The strategy this target was built for.
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// The mode this target was built in.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Percent-decoded user name; empty when the URL carries none.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Percent-decoded password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Whether the connection must be encrypted.
    pub fn ssl_required(&self) -> bool {
        self.ssl_required
    }

    /// Whether the target goes through the connection pooler.
    pub fn pooling(&self) -> bool {
        self.pooling
    }

    /// Query parameters of the resolved URL.
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Looks up a single query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// `connect_timeout` parameter, in seconds.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.param("connect_timeout")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
    }

    /// `pool_timeout` parameter, in seconds.
    pub fn pool_timeout(&self) -> Option<Duration> {
        self.param("pool_timeout")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
    }

    /// `connection_limit` parameter.
    pub fn connection_limit(&self) -> Option<u32> {
        self.param("connection_limit").and_then(|v| v.parse().ok())
    }

    /// Renders the complete URL, credentials included.
    pub fn to_url(&self) -> String {
        self.url.to_string()
    }

    /// Renders the URL with the password masked.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            // Only fails for URLs that cannot carry credentials.
            let _ = url.set_password(Some("****"));
        }
        url.to_string()
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("url", &self.redacted())
            .field("strategy", &self.strategy)
            .field("mode", &self.mode)
            .field("ssl_required", &self.ssl_required)
            .field("pooling", &self.pooling)
            .finish()
    }
}

/// Parses and validates the configured connection string.
pub(crate) fn parse_connection_string(env: &EnvironmentContext) -> Result<Url, ConfigurationError> {
    let raw = env
        .raw_connection_string()
        .ok_or(ConfigurationError::MissingConnectionString)?;
    let url = Url::parse(raw.trim()).map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(ConfigurationError::UnsupportedScheme(url.scheme().to_string()));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ConfigurationError::MissingHost),
    }
}

/// Builds the target for `strategy` with the default [`StrategySettings`].
pub fn build(
    env: &EnvironmentContext,
    strategy: StrategyKind,
) -> Result<ConnectionTarget, ConfigurationError> {
    build_with(env, strategy, &StrategySettings::default())
}

/// Builds the target for `strategy`.
///
/// - production, pooled: pooler port, `pgbouncer=true`, `sslmode=require`,
///   `connection_limit`, `pool_timeout`, `connect_timeout`, `schema`
/// - production, direct: server port, `sslmode=require`, `connect_timeout`,
///   `schema`; no pooler parameters
/// - development: the URL as given, minus `pgbouncer`
pub fn build_with(
    env: &EnvironmentContext,
    strategy: StrategyKind,
    settings: &StrategySettings,
) -> Result<ConnectionTarget, ConfigurationError> {
    let mut url = parse_connection_string(env)?;
    let mut params: BTreeMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mode = env.mode();
    let (ssl_required, pooling) = if mode.is_production() {
        for key in MANAGED_PARAMS {
            params.remove(*key);
        }
        params.insert("sslmode".to_string(), "require".to_string());
        params.insert("schema".to_string(), settings.schema.clone());
        params.insert(
            "connect_timeout".to_string(),
            settings.connect_timeout(strategy).as_secs().to_string(),
        );

        let port = match strategy {
            StrategyKind::Pooled => {
                params.insert("pgbouncer".to_string(), "true".to_string());
                params.insert(
                    "connection_limit".to_string(),
                    settings.connection_limit.to_string(),
                );
                params.insert(
                    "pool_timeout".to_string(),
                    settings.pool_timeout.as_secs().to_string(),
                );
                settings.pooled_port
            }
            StrategyKind::Direct => settings.direct_port,
        };
        url.set_port(Some(port))
            .map_err(|()| ConfigurationError::MissingHost)?;
        (true, strategy == StrategyKind::Pooled)
    } else {
        params.remove("pgbouncer");
        (false, false)
    };

    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params.iter());
    }

    let host = url.host_str().unwrap_or_default().to_string();
    let port = url.port().unwrap_or(DEFAULT_POSTGRES_PORT);
    let username = decode(url.username());
    let password = url.password().map(decode);
    let database = url
        .path()
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|db| !db.is_empty())
        .map(decode);

    let target = ConnectionTarget {
        url,
        strategy,
        mode,
        host,
        port,
        username,
        password,
        database,
        ssl_required,
        pooling,
        params,
    };

    tracing::info!(
        mode = %mode,
        strategy = %strategy,
        url = %target,
        "database connection strategy selected"
    );

    Ok(target)
}

fn decode(component: &str) -> String {
    urlencoding::decode(component)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| component.to_string())
}
