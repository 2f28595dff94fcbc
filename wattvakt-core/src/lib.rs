//! # wattvakt-core
//!
//! Domain types shared by every wattvakt component: per-source readings,
//! merged per-site snapshots, alert rule vocabulary and the clock
//! abstraction used by the scheduler and the alert engine.
//!
//! ### Key Submodules:
//! - `model`: readings, snapshots, metric validity and alert records
//! - `time`: wall clock, manual clock for tests, cadence boundaries

pub mod error;
pub mod model;
pub mod time;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::model::*;
    pub use crate::time::*;
}

pub use error::CoreError;
