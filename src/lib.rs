// dbdesk - desktop SQL workbench engine
// Core library

pub mod engine;
pub mod metrics;
pub mod observability;
pub mod profiles;
pub mod settings;
pub mod workbench;

pub use engine::{
    BackendKind, CellValue, ColumnDescriptor, ConnectionProfile, EngineError, EngineResult,
    ResultSet,
};
pub use profiles::ProfileStore;
pub use settings::Settings;
pub use workbench::Workbench;

/// Entry point for a host application: installs logging and opens the
/// workbench on the configured profile store.
pub fn start(settings: &Settings) -> EngineResult<Workbench> {
    observability::init_tracing(settings);
    let workbench = Workbench::from_settings(settings)?;
    tracing::info!(
        profiles = %settings.profiles_path.display(),
        "dbdesk engine ready"
    );
    Ok(workbench)
}
