//! Connection probe: open a connection and prove it answers.

use crate::error::{ConnectFailure, FailureKind};
use crate::target::ConnectionTarget;
use futures::future::BoxFuture;
use std::time::Duration;

/// Transport seam between the resilience layer and a database driver.
///
/// Implementations classify their own failures into a [`ConnectFailure`];
/// the scheduler decides what to do with them from the
/// [`FailureKind`] alone.
pub trait Connector: Send + Sync + 'static {
    /// The handle produced by a successful connect.
    type Connection: Send + Sync + 'static;

    /// Opens a connection to `target`.
    fn connect<'a>(
        &'a self,
        target: &'a ConnectionTarget,
    ) -> BoxFuture<'a, Result<Self::Connection, ConnectFailure>>;

    /// Runs the liveness query (`SELECT 1`) on an open connection.
    fn ping<'a>(&'a self, conn: &'a Self::Connection) -> BoxFuture<'a, Result<(), ConnectFailure>>;

    /// Releases a connection. Must not fail; errors are the implementation's
    /// to log.
    fn close<'a>(&'a self, conn: &'a Self::Connection) -> BoxFuture<'a, ()>;
}

/// Result of a single probe.
#[derive(Debug)]
pub enum AttemptOutcome<C> {
    /// Connected and the liveness query answered.
    Success(C),
    /// Either step failed.
    Failure(ConnectFailure),
}

impl<C> AttemptOutcome<C> {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }

    /// Converts into a `Result`.
    pub fn into_result(self) -> Result<C, ConnectFailure> {
        match self {
            AttemptOutcome::Success(conn) => Ok(conn),
            AttemptOutcome::Failure(failure) => Err(failure),
        }
    }
}

/// Opens a connection to `target` and runs the liveness query on it.
///
/// A connection that opens but fails the liveness query is closed before the
/// failure is returned. With `timeout` set, a probe running longer than the
/// limit fails with [`FailureKind::Timeout`].
pub async fn probe<C>(
    connector: &C,
    target: &ConnectionTarget,
    timeout: Option<Duration>,
) -> AttemptOutcome<C::Connection>
where
    C: Connector + ?Sized,
{
    let attempt = async {
        let conn = connector.connect(target).await?;
        match connector.ping(&conn).await {
            Ok(()) => Ok::<_, ConnectFailure>(conn),
            Err(failure) => {
                connector.close(&conn).await;
                Err(failure)
            }
        }
    };

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ConnectFailure::new(
                FailureKind::Timeout,
                format!("connection probe timed out after {}ms", limit.as_millis()),
            )),
        },
        None => attempt.await,
    };

    match result {
        Ok(conn) => AttemptOutcome::Success(conn),
        Err(failure) => {
            tracing::debug!(
                strategy = %target.strategy(),
                kind = %failure.kind(),
                error = %failure.message(),
                "connection probe failed"
            );
            AttemptOutcome::Failure(failure)
        }
    }
}
