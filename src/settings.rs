// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration
//!
//! Everything is read from `DBDESK_*` environment variables with sensible
//! defaults, so the engine works without any config file.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::limits::Limits;

pub const ENV_PROFILES_PATH: &str = "DBDESK_PROFILES_PATH";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "DBDESK_CONNECT_TIMEOUT_MS";
pub const ENV_PROBE_TIMEOUT_MS: &str = "DBDESK_PROBE_TIMEOUT_MS";
pub const ENV_FETCH_TIMEOUT_MS: &str = "DBDESK_FETCH_TIMEOUT_MS";
pub const ENV_LOG: &str = "DBDESK_LOG";

const APP_DIR: &str = ".dbapp";
const PROFILES_FILE: &str = "connections.json";
const DEFAULT_LOG_FILTER: &str = "dbdesk=info";

/// Engine settings. Timeouts of `None` wait indefinitely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub profiles_path: PathBuf,
    pub connect_timeout_ms: Option<u64>,
    pub probe_timeout_ms: Option<u64>,
    pub fetch_timeout_ms: Option<u64>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profiles_path: app_dir().join(PROFILES_FILE),
            connect_timeout_ms: Some(15_000),
            probe_timeout_ms: Some(10_000),
            fetch_timeout_ms: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let profiles_path = lookup(ENV_PROFILES_PATH)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.profiles_path);

        Self {
            profiles_path,
            connect_timeout_ms: timeout_ms(&lookup, ENV_CONNECT_TIMEOUT_MS, defaults.connect_timeout_ms),
            probe_timeout_ms: timeout_ms(&lookup, ENV_PROBE_TIMEOUT_MS, defaults.probe_timeout_ms),
            fetch_timeout_ms: timeout_ms(&lookup, ENV_FETCH_TIMEOUT_MS, defaults.fetch_timeout_ms),
            log_filter: lookup(ENV_LOG)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_filter),
        }
    }

    /// Base limits for every engine call made with these settings.
    pub fn limits(&self) -> Limits {
        Limits {
            dial: self.connect_timeout_ms.map(Duration::from_millis),
            probe: self.probe_timeout_ms.map(Duration::from_millis),
            fetch: self.fetch_timeout_ms.map(Duration::from_millis),
            cancel: None,
        }
    }

    /// Directory holding logs and the default profile file.
    pub fn data_dir(&self) -> PathBuf {
        self.profiles_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(app_dir)
    }
}

/// `0` disables the timeout; garbage keeps the default.
fn timeout_ms<F>(lookup: &F, key: &str, default: Option<u64>) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => None,
        Ok(ms) => Some(ms),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable timeout, using default");
            default
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
