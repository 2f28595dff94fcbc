//! # wattvakt Notifications
//!
//! The notification transport is external. This crate holds the `Notifier`
//! seam, two in-process sinks and the fire-and-forget `Dispatcher` that the
//! engine calls after a state transition has already happened.

pub mod dispatcher;
pub mod sinks;

pub use dispatcher::Dispatcher;
pub use sinks::{ChannelNotifier, LogNotifier, OutboundMessage};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use wattvakt_core::model::Severity;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        site_id: &str,
        rule_id: &str,
        severity: Severity,
        message: &str,
    ) -> Result<(), NotifyError>;
}
