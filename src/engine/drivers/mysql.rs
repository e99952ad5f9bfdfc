//! MySQL Driver
//!
//! Opens single MySQL/MariaDB connections and runs batches over the text
//! protocol, one statement at a time. Connections are returned unprobed;
//! see `Connector::probe`.

use futures::StreamExt;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{Connection, Executor, Row, Statement, ValueRef};

use crate::engine::batch;
use crate::engine::connector::SessionId;
use crate::engine::drivers::{describe_columns, fragment, shape_only};
use crate::engine::dsn::{DialTarget, MySqlTls, TlsChoice};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::limits::{Limits, Phase};
use crate::engine::materializer::{self, ScanRow};
use crate::engine::types::{BackendKind, ColumnDescriptor, ResultSet};
use crate::engine::value::CellValue;

fn ssl_mode(tls: MySqlTls) -> MySqlSslMode {
    match tls {
        MySqlTls::Disabled => MySqlSslMode::Disabled,
        MySqlTls::Preferred => MySqlSslMode::Preferred,
        MySqlTls::Required => MySqlSslMode::Required,
        MySqlTls::VerifyCa => MySqlSslMode::VerifyCa,
        MySqlTls::VerifyIdentity => MySqlSslMode::VerifyIdentity,
    }
}

pub(crate) fn connect_options(target: &DialTarget) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&target.host)
        .port(target.port)
        .username(&target.username);
    if !target.password.expose().is_empty() {
        options = options.password(target.password.expose());
    }
    if !target.database.is_empty() {
        options = options.database(&target.database);
    }
    // Without an explicit mode the driver default (preferred) applies.
    if let TlsChoice::MySql(Some(tls)) = target.tls {
        options = options.ssl_mode(ssl_mode(tls));
    }
    options
}

pub(crate) async fn open(target: &DialTarget) -> EngineResult<MySqlConnection> {
    MySqlConnection::connect_with(&connect_options(target))
        .await
        .map_err(|e| EngineError::dial_failed(e.to_string()))
}

pub(crate) async fn session_id(conn: &mut MySqlConnection) -> EngineResult<SessionId> {
    sqlx::query_scalar::<_, u64>("SELECT CAST(CONNECTION_ID() AS UNSIGNED)")
        .fetch_one(&mut *conn)
        .await
        .map(SessionId)
        .map_err(|e| EngineError::execution_error(e.to_string()))
}

/// Kills the statement `session` is running, leaving its connection open.
pub(crate) async fn cancel(conn: &mut MySqlConnection, session: SessionId) -> EngineResult<()> {
    let kill = format!("KILL QUERY {}", session);
    (&mut *conn)
        .execute(sqlx::raw_sql(&kill))
        .await
        .map(|_| ())
        .map_err(|e| EngineError::execution_error(e.to_string()))
}

pub(crate) async fn execute_batch(
    conn: &mut MySqlConnection,
    sql: &str,
    limits: &Limits,
) -> EngineResult<Vec<ResultSet>> {
    let mut sets = Vec::new();

    for statement in batch::split_statements(BackendKind::MySql, sql) {
        let drained = {
            let stream = sqlx::raw_sql(statement)
                .fetch_many(&mut *conn)
                .map(|item| item.map(fragment));
            materializer::drain(stream, limits).await?
        };

        if drained.is_single_empty_statement() {
            sets.extend(statement_shape(conn, statement, limits).await);
        } else {
            sets.extend(drained.sets);
        }
    }
    Ok(sets)
}

/// Column shape of a statement that returned no rows. Statements the
/// server will not prepare have none.
async fn statement_shape(
    conn: &mut MySqlConnection,
    sql: &str,
    limits: &Limits,
) -> Option<ResultSet> {
    limits
        .guard(Phase::Fetch, async {
            conn.prepare(sql)
                .await
                .map_err(|e| EngineError::execution_error(e.to_string()))
        })
        .await
        .ok()
        .and_then(|statement| shape_only(statement.columns()))
}

impl ScanRow for MySqlRow {
    type Error = sqlx::Error;

    fn columns(&self) -> Result<Vec<ColumnDescriptor>, sqlx::Error> {
        Ok(describe_columns(Row::columns(self)))
    }

    fn scan(&self) -> Result<Vec<CellValue>, sqlx::Error> {
        (0..self.len()).map(|idx| extract_cell(self, idx)).collect()
    }
}

/// Decodes one cell. Unsigned types are tried before signed ones so
/// `BIGINT UNSIGNED` values above `i64::MAX` survive as exact text.
pub(crate) fn extract_cell(row: &MySqlRow, idx: usize) -> Result<CellValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = sqlx::TypeInfo::name(&*raw.type_info()).to_string();

    if let Ok(v) = row.try_get::<u64, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<u32, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<u16, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<i8, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<u8, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<f32, _>(idx) {
        return Ok(v.into());
    }
    if let Ok(v) = row.try_get::<Decimal, _>(idx) {
        return Ok(CellValue::Text(v.to_string()));
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
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
    if let Ok(v) = row.try_get::<serde_json::Value, _>(idx) {
        return Ok(CellValue::Text(v.to_string()));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return Ok(v.into());
    }

    // DECIMAL beyond 28 digits, zero dates, YEAR, BIT, SET and the like.
    if let Ok(v) = row.try_get_unchecked::<String, _>(idx) {
        return Ok(CellValue::Text(v));
    }
    if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(idx) {
        return Ok(CellValue::Bytes(v));
    }
    Ok(CellValue::Other(format!("<{}>", type_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_modes_map_onto_driver_modes() {
        assert!(matches!(ssl_mode(MySqlTls::Disabled), MySqlSslMode::Disabled));
        assert!(matches!(ssl_mode(MySqlTls::Preferred), MySqlSslMode::Preferred));
        assert!(matches!(ssl_mode(MySqlTls::Required), MySqlSslMode::Required));
        assert!(matches!(ssl_mode(MySqlTls::VerifyCa), MySqlSslMode::VerifyCa));
        assert!(matches!(
            ssl_mode(MySqlTls::VerifyIdentity),
            MySqlSslMode::VerifyIdentity
        ));
    }
}
