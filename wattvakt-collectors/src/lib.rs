//! # wattvakt-collectors
//!
//! The collector contract every telemetry source satisfies, the registry that
//! maps a configured `kind` to an implementation, and the generic collectors
//! that ship with wattvakt.
//!
//! Vendor and protocol specific collectors live outside this crate; they
//! implement [`MetricSource`] (or [`Collector`] directly) and are added to a
//! [`CollectorRegistry`] under their own kind.

pub mod builtin;
pub mod error;
pub mod registry;
pub mod session;
pub mod source;

pub use error::CollectorError;
pub use registry::{CollectorFactory, CollectorRegistry};
pub use session::{Authenticator, SessionCollector, SessionToken};
pub use source::{Collector, Metrics, MetricSource, SourceCollector, SourceContext};
