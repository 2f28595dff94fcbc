use std::time::Duration;

use thiserror::Error;

/// Failures inside a collector. None of these cross the [`Collector`]
/// boundary; they are folded into an error or timeout reading.
///
/// [`Collector`]: crate::Collector
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Session expired")]
    AuthExpired,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid settings for '{kind}': {reason}")]
    InvalidSettings { kind: String, reason: String },

    #[error("No collector registered for kind '{0}'")]
    UnknownKind(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed payload: {0}")]
    Parse(#[from] serde_json::Error),
}
