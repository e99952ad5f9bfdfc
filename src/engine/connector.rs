//! Connection resolution
//!
//! The connector turns a profile into a live connection. MySQL is opened
//! once with whatever the profile says. Postgres negotiates TLS when the
//! profile leaves it open: plain first, then `sslmode=require` if the plain
//! attempt cannot be probed. An explicit sslmode is honored verbatim with
//! no fallback.
//!
//! Running a batch also happens here: the connector remembers which target
//! and server session a connection belongs to, so an interrupted batch can
//! be stopped on the server from a second connection.
//!
//! Driver I/O lives behind [`Dialer`] and [`LiveConnection`] so the
//! negotiation can be exercised without a server.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::engine::dsn::DialTarget;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::limits::{Limits, Phase};
use crate::engine::types::{BackendKind, ConnectionProfile, ResultSet};
use crate::metrics;

/// Server-side identity of a connection (`pg_backend_pid()`,
/// `CONNECTION_ID()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live, exclusively owned connection.
#[async_trait]
pub trait LiveConnection: Send {
    /// Active liveness check against the server.
    async fn ping(&mut self) -> EngineResult<()>;

    /// Asks the server which session this connection is.
    async fn session_id(&mut self) -> EngineResult<SessionId>;

    /// Executes `sql` as a batch and drains every result set it yields.
    async fn execute_batch(&mut self, sql: &str, limits: &Limits) -> EngineResult<Vec<ResultSet>>;

    /// Releases the connection. Never fails from the caller's view.
    async fn close(self);
}

/// Opens connections for validated targets.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Conn: LiveConnection;

    async fn open(&self, target: &DialTarget) -> EngineResult<Self::Conn>;

    /// Stops whatever statement `session` is running, over a fresh
    /// connection to `target`. The session itself stays open.
    async fn cancel(&self, target: &DialTarget, session: SessionId) -> EngineResult<()>;
}

/// How a postgres profile's sslmode is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsPlan<'a> {
    /// Unset or `prefer`: plain first, then required TLS.
    Negotiate,
    Explicit(&'a str),
}

impl<'a> TlsPlan<'a> {
    fn for_requested(requested: Option<&'a str>) -> Self {
        match requested {
            None | Some("prefer") => TlsPlan::Negotiate,
            Some(mode) => TlsPlan::Explicit(mode),
        }
    }
}

pub struct Connector<D> {
    dialer: D,
}

impl<D: Dialer> Connector<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    /// Resolves `profile` into a live connection.
    ///
    /// Postgres connections come back probed. MySQL connections are only
    /// opened; callers that need a liveness guarantee must [`probe`](Self::probe).
    pub async fn connect(
        &self,
        profile: &ConnectionProfile,
        limits: &Limits,
    ) -> EngineResult<D::Conn> {
        self.resolve(profile, limits).await.map(|(conn, _)| conn)
    }

    /// Connects, runs `sql` and releases the connection on every path.
    ///
    /// When the batch is cancelled or runs out of time, the statement still
    /// in flight is cancelled on the server before the connection is
    /// dropped.
    pub async fn execute(
        &self,
        profile: &ConnectionProfile,
        sql: &str,
        limits: &Limits,
    ) -> EngineResult<Vec<ResultSet>> {
        let (mut conn, target) = self.resolve(profile, limits).await?;

        let session = match limits.guard(Phase::Probe, conn.session_id()).await {
            Ok(session) => Some(session),
            Err(e) if e.is_interruption() => {
                conn.close().await;
                return Err(e);
            }
            Err(e) => {
                debug!(error = %e, "Session id unavailable, interruptions stay client-side");
                None
            }
        };

        let outcome = conn.execute_batch(sql, limits).await;
        if let (Err(e), Some(session)) = (&outcome, session) {
            if e.is_interruption() {
                self.interrupt(&target, session, limits).await;
            }
        }

        conn.close().await;
        outcome
    }

    /// Connects, makes sure the server answers, and releases the
    /// connection again. No query is executed.
    pub async fn test_connection(
        &self,
        profile: &ConnectionProfile,
        limits: &Limits,
    ) -> EngineResult<()> {
        let kind = profile.backend()?;
        let mut conn = self.connect(profile, limits).await?;

        let probed = if kind.probes_on_connect() {
            Ok(())
        } else {
            Self::probe(&mut conn, limits).await
        };

        conn.close().await;
        probed
    }

    pub async fn probe(conn: &mut D::Conn, limits: &Limits) -> EngineResult<()> {
        limits.guard(Phase::Probe, conn.ping()).await
    }

    /// Connection plus the target it was opened with.
    async fn resolve(
        &self,
        profile: &ConnectionProfile,
        limits: &Limits,
    ) -> EngineResult<(D::Conn, DialTarget)> {
        let result = match profile.backend()? {
            BackendKind::MySql => {
                let target = DialTarget::mysql(profile)?;
                debug!(dsn = %target, "Opening mysql connection");
                self.open(&target, limits).await.map(|conn| (conn, target))
            }
            BackendKind::Postgres => self.connect_postgres(profile, limits).await,
        };
        metrics::record_connect(result.is_ok());
        result
    }

    async fn connect_postgres(
        &self,
        profile: &ConnectionProfile,
        limits: &Limits,
    ) -> EngineResult<(D::Conn, DialTarget)> {
        match TlsPlan::for_requested(profile.tls_mode.as_deref()) {
            TlsPlan::Explicit(mode) => {
                let target = DialTarget::postgres(profile, mode)?;
                info!(dsn = %target, "Connecting with explicit sslmode={}", mode);
                let conn = self.attempt(&target, limits).await?;
                Ok((conn, target))
            }
            TlsPlan::Negotiate => {
                // Both targets are validated up front so a malformed profile
                // fails without touching the network.
                let plain = DialTarget::postgres(profile, "disable")?;
                let tls = DialTarget::postgres(profile, "require")?;

                info!("Trying to connect with sslmode=disable");
                match self.attempt(&plain, limits).await {
                    Ok(conn) => Ok((conn, plain)),
                    Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
                    Err(first) => {
                        info!(error = %first, "Trying to connect with sslmode=require");
                        metrics::record_tls_fallback();
                        let conn = self.attempt(&tls, limits).await?;
                        Ok((conn, tls))
                    }
                }
            }
        }
    }

    /// Server-side cancel of `session`. Runs under the call's timeouts but
    /// not its cancellation token, which has usually fired already.
    async fn interrupt(&self, target: &DialTarget, session: SessionId, limits: &Limits) {
        let detached = limits.detached();
        match detached
            .guard(Phase::Dial, self.dialer.cancel(target, session))
            .await
        {
            Ok(()) => {
                metrics::record_server_cancel();
                info!(session = %session, "Interrupted statement cancelled on the server");
            }
            Err(e) => warn!(
                session = %session,
                error = %e,
                "Could not cancel interrupted statement on the server"
            ),
        }
    }

    async fn open(&self, target: &DialTarget, limits: &Limits) -> EngineResult<D::Conn> {
        limits.guard(Phase::Dial, self.dialer.open(target)).await
    }

    /// Open plus probe. A connection that fails its probe is released
    /// before the error is returned.
    async fn attempt(&self, target: &DialTarget, limits: &Limits) -> EngineResult<D::Conn> {
        let mut conn = self.open(target, limits).await?;
        match Self::probe(&mut conn, limits).await {
            Ok(()) => Ok(conn),
            Err(e) => {
                conn.close().await;
                Err(e)
            }
        }
    }
}
