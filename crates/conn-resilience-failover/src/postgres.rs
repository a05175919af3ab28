//! sqlx-backed PostgreSQL connector.

use crate::error::{ConnectFailure, ConnectionError, FailureKind};
use crate::probe::Connector;
use crate::target::ConnectionTarget;
use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::io;
use std::time::Duration;

/// Pool size when the target does not set `connection_limit`.
const DEFAULT_POOL_SIZE: u32 = 10;

/// Acquire timeout when the target does not set `connect_timeout`.
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens a [`PgPool`] per successful probe.
#[derive(Debug, Clone, Default)]
pub struct PgConnector {
    application_name: Option<String>,
}

impl PgConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `name` as `application_name` to the server.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Maps a target onto sqlx connect options.
    pub fn connect_options(&self, target: &ConnectionTarget) -> PgConnectOptions {
        let ssl_mode = if target.ssl_required() {
            PgSslMode::Require
        } else {
            target
                .param("sslmode")
                .and_then(|mode| mode.parse().ok())
                .unwrap_or(PgSslMode::Prefer)
        };

        let mut options = PgConnectOptions::new_without_pgpass()
            .host(target.host())
            .port(target.port())
            .ssl_mode(ssl_mode);

        if !target.username().is_empty() {
            options = options.username(target.username());
        }
        if let Some(password) = target.password() {
            options = options.password(password);
        }
        if let Some(database) = target.database() {
            options = options.database(database);
        }
        if let Some(schema) = target.param("schema") {
            options = options.options([("search_path", schema)]);
        }
        if let Some(name) = self
            .application_name
            .as_deref()
            .or_else(|| target.param("application_name"))
        {
            options = options.application_name(name);
        }
        // pgbouncer in transaction mode cannot keep prepared statements
        if target.pooling() {
            options = options.statement_cache_capacity(0);
        }
        options
    }

    /// Maps a target onto pool options.
    pub fn pool_options(&self, target: &ConnectionTarget) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(target.connection_limit().unwrap_or(DEFAULT_POOL_SIZE))
            .acquire_timeout(target.connect_timeout().unwrap_or(DEFAULT_ACQUIRE_TIMEOUT))
    }
}

impl Connector for PgConnector {
    type Connection = PgPool;

    fn connect<'a>(
        &'a self,
        target: &'a ConnectionTarget,
    ) -> BoxFuture<'a, Result<PgPool, ConnectFailure>> {
        Box::pin(async move {
            self.pool_options(target)
                .connect_with(self.connect_options(target))
                .await
                .map_err(|e| classify(&e))
        })
    }

    fn ping<'a>(&'a self, pool: &'a PgPool) -> BoxFuture<'a, Result<(), ConnectFailure>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(pool)
                .await
                .map(|_| ())
                .map_err(|e| classify(&e))
        })
    }

    fn close<'a>(&'a self, pool: &'a PgPool) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            pool.close().await;
        })
    }
}

/// Classifies a sqlx error.
pub fn classify(error: &sqlx::Error) -> ConnectFailure {
    match error {
        sqlx::Error::PoolTimedOut => ConnectFailure::new(FailureKind::Timeout, error.to_string()),
        sqlx::Error::Io(io_error) => {
            let kind = match io_error.kind() {
                io::ErrorKind::TimedOut => FailureKind::Timeout,
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::AddrNotAvailable
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => FailureKind::NetworkUnreachable,
                _ => FailureKind::from_message(&io_error.to_string()),
            };
            ConnectFailure::new(kind, error.to_string())
        }
        sqlx::Error::Tls(_) => {
            ConnectFailure::new(FailureKind::NetworkUnreachable, error.to_string())
        }
        sqlx::Error::Database(db_error) => {
            let message = db_error.message().to_string();
            let code = db_error.code().map(|c| c.into_owned());
            let kind = match code.as_deref() {
                // invalid_password, invalid_authorization_specification
                Some("28P01") | Some("28000") => FailureKind::AuthenticationFailure,
                // too_many_connections, cannot_connect_now
                Some("53300") | Some("57P03") => FailureKind::NetworkUnreachable,
                _ => FailureKind::from_message(&message),
            };
            let failure = ConnectFailure::new(kind, message);
            match code {
                Some(code) => failure.with_code(code),
                None => failure,
            }
        }
        other => ConnectFailure::from_message(other.to_string()),
    }
}

/// Returns `true` when no pooled connection became free in time.
pub fn is_pool_exhaustion(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::PoolTimedOut)
}

impl From<sqlx::Error> for ConnectionError {
    fn from(error: sqlx::Error) -> Self {
        if is_pool_exhaustion(&error) {
            ConnectionError::PoolExhausted(error.to_string())
        } else {
            ConnectionError::from_fatal(classify(&error))
        }
    }
}
