use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use wattvakt_core::model::Severity;

use crate::{Notifier, NotifyError};

/// Writes notifications to the log. The default sink when no transport is wired.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        site_id: &str,
        rule_id: &str,
        severity: Severity,
        message: &str,
    ) -> Result<(), NotifyError> {
        match severity {
            Severity::Critical | Severity::High => {
                error!(site = %site_id, rule = %rule_id, %severity, "{message}")
            }
            Severity::Medium | Severity::Low => {
                warn!(site = %site_id, rule = %rule_id, %severity, "{message}")
            }
            Severity::Info => info!(site = %site_id, rule = %rule_id, %severity, "{message}"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub site_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
}

/// Hands notifications to another task, e.g. an external transport bridge.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(
        &self,
        site_id: &str,
        rule_id: &str,
        severity: Severity,
        message: &str,
    ) -> Result<(), NotifyError> {
        self.tx
            .send(OutboundMessage {
                site_id: site_id.to_string(),
                rule_id: rule_id.to_string(),
                severity,
                message: message.to_string(),
            })
            .map_err(|_| NotifyError::ChannelClosed)
    }
}
