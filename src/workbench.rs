//! Orchestration
//!
//! The workbench is what a UI calls: test a profile, run SQL against it, or
//! do either by saved profile id. Every call acquires its own connection
//! and releases it before returning, whatever the outcome.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::engine::connector::{Connector, Dialer};
use crate::engine::drivers::SqlxDialer;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::limits::Limits;
use crate::engine::types::{ConnectionProfile, ResultSet};
use crate::metrics;
use crate::profiles::ProfileStore;
use crate::settings::Settings;

pub struct Workbench<D = SqlxDialer> {
    connector: Connector<D>,
    limits: Limits,
    store: Option<ProfileStore>,
}

impl Workbench<SqlxDialer> {
    /// Production workbench: sqlx connections, configured limits and the
    /// profile store at the configured path.
    pub fn from_settings(settings: &Settings) -> EngineResult<Self> {
        let store = ProfileStore::open(&settings.profiles_path)?;
        Ok(Self::new(SqlxDialer, settings.limits()).with_store(store))
    }
}

impl<D: Dialer> Workbench<D> {
    pub fn new(dialer: D, limits: Limits) -> Self {
        Self {
            connector: Connector::new(dialer),
            limits,
            store: None,
        }
    }

    pub fn with_store(mut self, store: ProfileStore) -> Self {
        self.store = Some(store);
        self
    }

    fn store(&self) -> EngineResult<&ProfileStore> {
        self.store
            .as_ref()
            .ok_or_else(|| EngineError::internal("No profile store configured"))
    }

    /// Checks that the profile can be connected to. No query is run.
    #[instrument(
        skip(self, profile),
        fields(
            backend = %profile.kind,
            host = %profile.host,
            port = profile.port,
            database = %profile.database
        )
    )]
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> EngineResult<()> {
        let result = self.connector.test_connection(profile, &self.limits).await;
        match &result {
            Ok(()) => info!("Connection test succeeded"),
            Err(e) => {
                note_interruption(e);
                warn!(error = %e, "Connection test failed");
            }
        }
        result
    }

    pub async fn test_saved_connection(&self, id: &str) -> EngineResult<()> {
        let profile = self.store()?.get(id)?;
        self.test_connection(&profile).await
    }

    /// Runs `sql` and returns every result set it produced, in order.
    pub async fn run(&self, profile: &ConnectionProfile, sql: &str) -> EngineResult<Vec<ResultSet>> {
        self.run_with(profile, sql, self.limits.clone()).await
    }

    /// Like [`run`](Self::run), abandoned with `Cancelled` once `token` fires.
    pub async fn run_cancellable(
        &self,
        profile: &ConnectionProfile,
        sql: &str,
        token: CancellationToken,
    ) -> EngineResult<Vec<ResultSet>> {
        self.run_with(profile, sql, self.limits.clone().with_cancel(token))
            .await
    }

    pub async fn run_saved(&self, id: &str, sql: &str) -> EngineResult<Vec<ResultSet>> {
        let profile = self.store()?.get(id)?;
        self.run(&profile, sql).await
    }

    #[instrument(
        skip(self, profile, sql, limits),
        fields(
            backend = %profile.kind,
            host = %profile.host,
            port = profile.port,
            database = %profile.database,
            sql_len = sql.len()
        )
    )]
    async fn run_with(
        &self,
        profile: &ConnectionProfile,
        sql: &str,
        limits: Limits,
    ) -> EngineResult<Vec<ResultSet>> {
        let start = Instant::now();
        let result = self.connector.execute(profile, sql, &limits).await;
        let elapsed_ms = start.elapsed().as_micros() as f64 / 1000.0;
        metrics::record_query(elapsed_ms, result.is_ok());

        match &result {
            Ok(sets) => info!(result_sets = sets.len(), elapsed_ms, "Query finished"),
            Err(e) => {
                note_interruption(e);
                warn!(error = %e, elapsed_ms, "Query failed");
            }
        }
        result
    }

    pub fn profiles(&self) -> EngineResult<Vec<ConnectionProfile>> {
        Ok(self.store()?.list())
    }

    pub fn save_profile(&self, profile: ConnectionProfile) -> EngineResult<()> {
        self.store()?.save(profile)
    }

    pub fn delete_profile(&self, id: &str) -> EngineResult<()> {
        self.store()?.delete(id)
    }
}

fn note_interruption(err: &EngineError) {
    match err {
        EngineError::Cancelled => metrics::record_cancel(),
        EngineError::Timeout { .. } => metrics::record_timeout(),
        _ => {}
    }
}
