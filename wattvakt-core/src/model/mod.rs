//! ## wattvakt-core::model
//! Readings as collectors produce them, snapshots as the store keeps them,
//! and the alert vocabulary the rule engine evaluates against snapshots.

pub mod alert;
pub mod metric;
pub mod reading;
pub mod snapshot;

pub use alert::{
    AlertKey, AlertPhase, AlertRecord, AlertState, AlertStateEntry, Comparator, Severity,
    STALENESS_METRIC,
};
pub use metric::{MergeStrategy, Unit, Validity};
pub use reading::{ReadingStatus, SourceReading};
pub use snapshot::{MetricValue, Snapshot, SourceFailure};
