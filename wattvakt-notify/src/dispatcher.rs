use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use wattvakt_core::model::Severity;

use crate::{Notifier, NotifyError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire-and-forget front for a `Notifier`.
///
/// Failures and timeouts are logged and reported as `false`; they never
/// propagate to the caller.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns whether the sink accepted the notification.
    pub async fn dispatch(
        &self,
        site_id: &str,
        rule_id: &str,
        severity: Severity,
        message: &str,
    ) -> bool {
        let send = self.notifier.send(site_id, rule_id, severity, message);
        let result = match tokio::time::timeout(self.timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.timeout)),
        };
        match result {
            Ok(()) => {
                debug!(site = %site_id, rule = %rule_id, "Notification delivered");
                true
            }
            Err(e) => {
                warn!(site = %site_id, rule = %rule_id, error = %e, "Notification delivery failed");
                false
            }
        }
    }
}
