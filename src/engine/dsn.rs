//! Connection-string construction
//!
//! A [`DialTarget`] is everything a driver needs to open one connection:
//! the profile's address and credentials plus the TLS mode for this
//! particular attempt. It is validated here, before any network I/O, and
//! renders the backend's native connection string for diagnostics.

use std::fmt;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::types::{BackendKind, ConnectionProfile};
use crate::observability::Sensitive;

/// sslmode literals libpq (and sqlx) accept.
pub const POSTGRES_SSL_MODES: &[&str] = &[
    "disable",
    "allow",
    "prefer",
    "require",
    "verify-ca",
    "verify-full",
];

const REDACTED_PASSWORD: &str = "***";

/// MySQL TLS posture, mapped from the profile's literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MySqlTls {
    Disabled,
    Preferred,
    Required,
    VerifyCa,
    VerifyIdentity,
}

impl MySqlTls {
    pub fn parse(literal: &str) -> Option<Self> {
        match literal.to_ascii_lowercase().as_str() {
            "disable" | "disabled" => Some(Self::Disabled),
            "prefer" | "preferred" => Some(Self::Preferred),
            "require" | "required" => Some(Self::Required),
            "verify-ca" | "verify_ca" => Some(Self::VerifyCa),
            "verify-full" | "verify-identity" | "verify_identity" => Some(Self::VerifyIdentity),
            _ => None,
        }
    }

    /// Value for the `tls` parameter of a go-style MySQL DSN.
    fn dsn_param(&self) -> &'static str {
        match self {
            Self::Disabled => "false",
            Self::Preferred => "preferred",
            Self::Required => "skip-verify",
            Self::VerifyCa | Self::VerifyIdentity => "true",
        }
    }
}

/// Backend-specific TLS choice for one dial attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsChoice {
    /// Postgres sslmode literal, passed through verbatim.
    Postgres(String),
    /// `None` leaves the driver default in place.
    MySql(Option<MySqlTls>),
}

/// A validated, ready-to-dial connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Sensitive<String>,
    pub database: String,
    pub tls: TlsChoice,
}

impl DialTarget {
    /// Postgres target with an explicit sslmode literal.
    pub fn postgres(profile: &ConnectionProfile, sslmode: &str) -> EngineResult<Self> {
        if !POSTGRES_SSL_MODES.contains(&sslmode) {
            return Err(EngineError::dial_failed(format!(
                "invalid sslmode \"{}\" (expected one of: {})",
                sslmode,
                POSTGRES_SSL_MODES.join(", ")
            )));
        }
        Self::build(
            profile,
            BackendKind::Postgres,
            TlsChoice::Postgres(sslmode.to_string()),
        )
    }

    /// MySQL target; the profile's TLS mode, if any, is mapped onto the
    /// driver's modes.
    pub fn mysql(profile: &ConnectionProfile) -> EngineResult<Self> {
        let tls = match profile.tls_mode.as_deref() {
            None => None,
            Some(literal) => Some(MySqlTls::parse(literal).ok_or_else(|| {
                EngineError::dial_failed(format!("invalid TLS mode \"{}\" for mysql", literal))
            })?),
        };
        Self::build(profile, BackendKind::MySql, TlsChoice::MySql(tls))
    }

    fn build(profile: &ConnectionProfile, kind: BackendKind, tls: TlsChoice) -> EngineResult<Self> {
        if profile.host.trim().is_empty() {
            return Err(EngineError::dial_failed("host must not be empty"));
        }
        if profile.port == 0 {
            return Err(EngineError::dial_failed("port must be a positive integer"));
        }

        Ok(Self {
            kind,
            host: profile.host.clone(),
            port: profile.port,
            username: profile.username.clone(),
            password: Sensitive::new(profile.password.clone()),
            database: profile.database.clone(),
            tls,
        })
    }

    /// The sslmode of a postgres target, `None` for other backends.
    pub fn sslmode(&self) -> Option<&str> {
        match &self.tls {
            TlsChoice::Postgres(mode) => Some(mode),
            TlsChoice::MySql(_) => None,
        }
    }

    /// Native connection string, password included. Drivers are configured
    /// from the fields, so this only exists to check the rendering.
    #[cfg(test)]
    fn connection_string(&self) -> String {
        self.render(self.password.expose())
    }

    /// Native connection string with the password masked; safe to log.
    pub fn redacted(&self) -> String {
        self.render(REDACTED_PASSWORD)
    }

    fn render(&self, password: &str) -> String {
        match &self.tls {
            TlsChoice::Postgres(sslmode) => format!(
                "host={} port={} user={} password={} dbname={} sslmode={}",
                self.host, self.port, self.username, password, self.database, sslmode
            ),
            TlsChoice::MySql(tls) => {
                let mut dsn = format!(
                    "{}:{}@tcp({}:{})/{}",
                    self.username, password, self.host, self.port, self.database
                );
                if let Some(tls) = tls {
                    dsn.push_str("?tls=");
                    dsn.push_str(tls.dsn_param());
                }
                dsn
            }
        }
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
