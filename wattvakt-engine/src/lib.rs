//! # wattvakt Engine
//!
//! Drives the polling-aggregation-alerting pipeline:
//! scheduler tick → per-site concurrent collection → fallback merge →
//! store commit → alert evaluation → notification.
//!
//! ### Key Submodules:
//! - `aggregator`: per-source concurrency, deadlines, in-flight guards
//! - `merge`: order-independent fallback-chain merge
//! - `gate`: commit gate closed by shutdown
//! - `runtime`: the cycle runner
//! - `scheduler`: wall-clock cadence, skip-on-overlap, bounded stop
//! - `summary`: daily digest

pub mod aggregator;
pub mod error;
pub mod gate;
pub mod merge;
pub mod runtime;
pub mod scheduler;
pub mod summary;

pub use aggregator::{Aggregator, SitePlan};
pub use error::EngineError;
pub use gate::CommitGate;
pub use merge::{merge, MergePlan};
pub use runtime::{CycleReport, CycleRunner, SiteOutcome};
pub use scheduler::Scheduler;
