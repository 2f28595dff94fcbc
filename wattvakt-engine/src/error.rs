use thiserror::Error;
use tokio::task::JoinError;

use wattvakt_alerts::AlertError;
use wattvakt_collectors::CollectorError;
use wattvakt_config::ConfigError;
use wattvakt_core::CoreError;
use wattvakt_store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Collector setup failed for {site}/{source}: {error}")]
    Registry {
        site: String,
        source: String,
        #[source]
        error: CollectorError,
    },

    #[error("Alert setup failed: {0}")]
    Alerts(#[from] AlertError),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Clock error: {0}")]
    Time(#[from] CoreError),

    #[error("Engine is shutting down")]
    Shutdown,

    #[error("Task failed: {0}")]
    Join(#[from] JoinError),
}
