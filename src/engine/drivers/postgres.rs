//! PostgreSQL Driver
//!
//! Opens single connections with an explicit sslmode and runs batches over
//! the simple query protocol, one statement at a time.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use futures::StreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::{Connection, Executor, Row, Statement, ValueRef};
use uuid::Uuid;

use crate::engine::batch;
use crate::engine::connector::SessionId;
use crate::engine::drivers::{describe_columns, fragment, shape_only};
use crate::engine::dsn::DialTarget;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::limits::{Limits, Phase};
use crate::engine::materializer::{self, ScanRow};
use crate::engine::types::{BackendKind, ColumnDescriptor, ResultSet};
use crate::engine::value::CellValue;

/// Type name sqlx reports for an oid it has not looked up.
const UNRESOLVED_TYPE: &str = "?";

/// Builds connect options from the target's fields. Nothing is re-parsed
/// from text, so credentials need no escaping.
pub(crate) fn connect_options(target: &DialTarget) -> EngineResult<PgConnectOptions> {
    let sslmode = target.sslmode().unwrap_or("prefer");
    let ssl_mode = PgSslMode::from_str(sslmode)
        .map_err(|e| EngineError::dial_failed(format!("invalid sslmode: {}", e)))?;

    let mut options = PgConnectOptions::new_without_pgpass()
        .host(&target.host)
        .port(target.port)
        .username(&target.username)
        .ssl_mode(ssl_mode)
        .application_name("dbdesk");
    if !target.password.expose().is_empty() {
        options = options.password(target.password.expose());
    }
    if !target.database.is_empty() {
        options = options.database(&target.database);
    }
    Ok(options)
}

pub(crate) async fn open(target: &DialTarget) -> EngineResult<PgConnection> {
    let options = connect_options(target)?;
    PgConnection::connect_with(&options)
        .await
        .map_err(|e| EngineError::dial_failed(e.to_string()))
}

pub(crate) async fn session_id(conn: &mut PgConnection) -> EngineResult<SessionId> {
    let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| EngineError::execution_error(e.to_string()))?;
    u64::try_from(pid)
        .map(SessionId)
        .map_err(|_| EngineError::internal(format!("invalid backend pid {}", pid)))
}

/// Cancels the statement `session` is running. Its connection survives.
pub(crate) async fn cancel(conn: &mut PgConnection, session: SessionId) -> EngineResult<()> {
    let pid = i32::try_from(session.0)
        .map_err(|_| EngineError::internal(format!("invalid backend pid {}", session)))?;
    let signalled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
        .bind(pid)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| EngineError::execution_error(e.to_string()))?;
    if !signalled {
        tracing::debug!(pid, "Backend was gone before it could be cancelled");
    }
    Ok(())
}

pub(crate) async fn execute_batch(
    conn: &mut PgConnection,
    sql: &str,
    limits: &Limits,
) -> EngineResult<Vec<ResultSet>> {
    let mut sets = Vec::new();

    for statement in batch::split_statements(BackendKind::Postgres, sql) {
        let drained = {
            let stream = sqlx::raw_sql(statement)
                .fetch_many(&mut *conn)
                .map(|item| item.map(fragment));
            materializer::drain(stream, limits).await?
        };

        if drained.is_single_empty_statement() {
            sets.extend(statement_shape(conn, statement, limits).await);
            continue;
        }

        let mut drained_sets = drained.sets;
        if let [set] = drained_sets.as_mut_slice() {
            if has_unresolved_types(set) {
                if let Some(shape) = statement_shape(conn, statement, limits).await {
                    resolve_type_names(set, &shape);
                }
            }
        }
        sets.extend(drained_sets);
    }
    Ok(sets)
}

/// Column shape of one statement. Prepared, not run. Preparing also looks
/// up the names of types the simple protocol only reports by oid.
async fn statement_shape(conn: &mut PgConnection, sql: &str, limits: &Limits) -> Option<ResultSet> {
    let prepared = limits
        .guard(Phase::Fetch, async {
            conn.prepare(sql)
                .await
                .map_err(|e| EngineError::execution_error(e.to_string()))
        })
        .await;
    match prepared {
        Ok(statement) => shape_only(statement.columns()),
        Err(e) => {
            tracing::debug!(error = %e, "Could not describe statement");
            None
        }
    }
}

/// Enums, domains and other user-defined types come back nameless from the
/// simple query protocol.
fn has_unresolved_types(set: &ResultSet) -> bool {
    set.columns.iter().any(|c| c.type_name == UNRESOLVED_TYPE)
}

fn resolve_type_names(set: &mut ResultSet, shape: &ResultSet) {
    for (column, described) in set.columns.iter_mut().zip(&shape.columns) {
        if column.type_name == UNRESOLVED_TYPE && described.type_name != UNRESOLVED_TYPE {
            column.type_name = described.type_name.clone();
        }
    }
}

impl ScanRow for PgRow {
    type Error = sqlx::Error;

    fn columns(&self) -> Result<Vec<ColumnDescriptor>, sqlx::Error> {
        Ok(describe_columns(Row::columns(self)))
    }

    fn scan(&self) -> Result<Vec<CellValue>, sqlx::Error> {
        (0..self.len()).map(|idx| extract_cell(self, idx)).collect()
    }
}

/// Decodes one cell into its semantic shape.
///
/// Types are tried from most to least specific; `try_get` checks type
/// compatibility first, so a mismatch is cheap. Anything not covered falls
/// back to the raw text of the value.
pub(crate) fn extract_cell(row: &PgRow, idx: usize) -> Result<CellValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = sqlx::TypeInfo::name(&*raw.type_info()).to_string();

    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<i8, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<f32, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<BigDecimal, _>(idx) {
        return Ok(CellValue::Text(v.to_plain_string()));
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(idx) {
        return Ok(CellValue::Text(v.to_string()));
    }
    if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(idx) {
        return Ok(CellValue::Text(v.to_string()));
    }
    if let Ok(v) = row.try_get::<Uuid, _>(idx) {
        return Ok(CellValue::Text(v.to_string()));
    }
    if let Ok(v) = row.try_get::<serde_json::Value, _>(idx) {
        return Ok(CellValue::Text(v.to_string()));
    }

    // Enums, arrays, intervals, network types, NUMERIC 'NaN' and the like.
    if let Ok(v) = row.try_get_unchecked::<String, _>(idx) {
        return Ok(CellValue::Text(v));
    }
    if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(idx) {
        return Ok(CellValue::Bytes(v));
    }
    Ok(CellValue::Other(format!("<{}>", type_name)))
}
