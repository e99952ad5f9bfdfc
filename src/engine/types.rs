//! Universal data types for the dbdesk engine
//!
//! Profiles describe where to connect; result sets describe what came back.
//! Both are plain data and cross to the UI layer through serde.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::error::EngineError;
use crate::observability::Sensitive;

/// A saved or ad-hoc connection profile.
///
/// Field names on the wire match the `connections.json` format, hence the
/// `type` and `sslmode` renames.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: String,
    pub name: String,
    /// Backend kind as written by the caller ("postgres" or "mysql").
    /// Kept as a raw string so unknown kinds surface as a typed error
    /// instead of a deserialization failure.
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// Requested TLS mode. `None` or `prefer` lets the connector negotiate.
    #[serde(rename = "sslmode", default)]
    pub tls_mode: Option<String>,
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &Sensitive::new(&self.password))
            .field("database", &self.database)
            .field("tls_mode", &self.tls_mode)
            .finish()
    }
}

impl ConnectionProfile {
    /// Resolves the declared backend kind, rejecting anything unsupported.
    pub fn backend(&self) -> Result<BackendKind, EngineError> {
        self.kind.parse()
    }
}

/// Supported backends. Adding one means adding a variant here and handling
/// it in every exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::MySql => "mysql",
        }
    }

    /// Whether `Connector::connect` already probes liveness for this backend.
    pub fn probes_on_connect(&self) -> bool {
        match self {
            BackendKind::Postgres => true,
            BackendKind::MySql => false,
        }
    }
}

impl FromStr for BackendKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(BackendKind::Postgres),
            "mysql" => Ok(BackendKind::MySql),
            other => Err(EngineError::unsupported_backend(other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Backend-native type name (e.g. `INT4`, `VARCHAR`), not normalized.
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One fully drained result set: columns plus rows of display strings.
///
/// Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<String>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
