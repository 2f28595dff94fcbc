use thiserror::Error;

use wattvakt_config::ConfigError;
use wattvakt_engine::EngineError;
use wattvakt_store::StoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_yaml::Error),

    #[error("Unknown site '{0}'")]
    UnknownSite(String),

    #[error("Signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}
