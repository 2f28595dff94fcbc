use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("Metric '{metric}' has a non-finite value")]
    NonFiniteValue { metric: String },

    #[error("Cadence must be greater than zero")]
    ZeroCadence,

    #[error("Timestamp out of range")]
    TimeOutOfRange,
}
