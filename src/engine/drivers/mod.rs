// SPDX-License-Identifier: Apache-2.0

//! Database drivers
//!
//! sqlx-backed connections for each supported backend. A connection is one
//! socket, opened per call and closed when the call ends.

pub mod mysql;
pub mod postgres;

use async_trait::async_trait;
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use sqlx::{Column, Connection, Either, TypeInfo};
use tracing::debug;

use crate::engine::connector::{Dialer, LiveConnection, SessionId};
use crate::engine::dsn::DialTarget;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::limits::Limits;
use crate::engine::materializer::Fragment;
use crate::engine::types::{BackendKind, ColumnDescriptor, ResultSet};

/// Opens real connections through sqlx.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxDialer;

#[async_trait]
impl Dialer for SqlxDialer {
    type Conn = ConnectionHandle;

    async fn open(&self, target: &DialTarget) -> EngineResult<ConnectionHandle> {
        match target.kind {
            BackendKind::Postgres => postgres::open(target).await.map(ConnectionHandle::Postgres),
            BackendKind::MySql => mysql::open(target).await.map(ConnectionHandle::MySql),
        }
    }

    async fn cancel(&self, target: &DialTarget, session: SessionId) -> EngineResult<()> {
        let mut conn = self.open(target).await?;
        let result = match &mut conn {
            ConnectionHandle::Postgres(pg) => postgres::cancel(pg, session).await,
            ConnectionHandle::MySql(my) => mysql::cancel(my, session).await,
        };
        conn.close().await;
        result
    }
}

/// A live connection to one of the supported backends.
#[derive(Debug)]
pub enum ConnectionHandle {
    Postgres(PgConnection),
    MySql(MySqlConnection),
}

impl ConnectionHandle {
    pub fn backend(&self) -> BackendKind {
        match self {
            ConnectionHandle::Postgres(_) => BackendKind::Postgres,
            ConnectionHandle::MySql(_) => BackendKind::MySql,
        }
    }
}

#[async_trait]
impl LiveConnection for ConnectionHandle {
    async fn ping(&mut self) -> EngineResult<()> {
        let result = match self {
            ConnectionHandle::Postgres(conn) => conn.ping().await,
            ConnectionHandle::MySql(conn) => conn.ping().await,
        };
        result.map_err(|e| EngineError::probe_failed(e.to_string()))
    }

    async fn session_id(&mut self) -> EngineResult<SessionId> {
        match self {
            ConnectionHandle::Postgres(conn) => postgres::session_id(conn).await,
            ConnectionHandle::MySql(conn) => mysql::session_id(conn).await,
        }
    }

    async fn execute_batch(&mut self, sql: &str, limits: &Limits) -> EngineResult<Vec<ResultSet>> {
        match self {
            ConnectionHandle::Postgres(conn) => postgres::execute_batch(conn, sql, limits).await,
            ConnectionHandle::MySql(conn) => mysql::execute_batch(conn, sql, limits).await,
        }
    }

    async fn close(self) {
        let backend = self.backend();
        let result = match self {
            ConnectionHandle::Postgres(conn) => conn.close().await,
            ConnectionHandle::MySql(conn) => conn.close().await,
        };
        // The socket is gone either way; a failed goodbye is not actionable.
        if let Err(e) = result {
            debug!(backend = %backend, error = %e, "Connection close reported an error");
        }
    }
}

/// Maps a `fetch_many` item onto the materializer's fragment shape.
pub(crate) fn fragment<Q, R>(item: Either<Q, R>) -> Fragment<R> {
    match item {
        Either::Left(_) => Fragment::StatementDone,
        Either::Right(row) => Fragment::Row(row),
    }
}

pub(crate) fn describe_columns<C: Column>(columns: &[C]) -> Vec<ColumnDescriptor> {
    columns
        .iter()
        .map(|col| ColumnDescriptor::new(col.name(), col.type_info().name()))
        .collect()
}

/// Result set for a prepared statement's column shape, if it has one.
pub(crate) fn shape_only<C: Column>(columns: &[C]) -> Option<ResultSet> {
    if columns.is_empty() {
        None
    } else {
        Some(ResultSet::new(describe_columns(columns)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_items_map_to_fragments() {
        assert!(matches!(
            fragment::<u64, &str>(Either::Left(3)),
            Fragment::StatementDone
        ));
        assert!(matches!(
            fragment::<u64, &str>(Either::Right("row")),
            Fragment::Row("row")
        ));
    }
}
