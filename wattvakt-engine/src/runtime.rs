//! Cycle runtime: collect, commit, evaluate and notify for every site.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use wattvakt_alerts::{AlertEngine, Notification};
use wattvakt_collectors::CollectorRegistry;
use wattvakt_config::{SiteConfig, WattvaktConfig};
use wattvakt_core::model::{Severity, Unit};
use wattvakt_core::time::Clock;
use wattvakt_notify::{Dispatcher, Notifier};
use wattvakt_store::SnapshotStore;
use wattvakt_telemetry::{EventLogger, MetricsRecorder};

use crate::aggregator::{Aggregator, SitePlan};
use crate::gate::CommitGate;
use crate::summary::{self, SUMMARY_RULE, SUMMARY_SITE};
use crate::EngineError;

/// What happened to one site during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteOutcome {
    pub site_id: String,
    pub committed: bool,
    pub metrics: usize,
    pub failures: usize,
    pub alerts: usize,
}

impl SiteOutcome {
    fn new(site_id: &str) -> Self {
        Self {
            site_id: site_id.to_string(),
            committed: false,
            metrics: 0,
            failures: 0,
            alerts: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub taken_at: DateTime<Utc>,
    pub sites: Vec<SiteOutcome>,
}

impl CycleReport {
    pub fn site(&self, site_id: &str) -> Option<&SiteOutcome> {
        self.sites.iter().find(|s| s.site_id == site_id)
    }
}

/// Runs one collection cycle at a time on behalf of the scheduler (or the
/// `once` command). Holds everything a cycle touches.
pub struct CycleRunner {
    aggregator: Aggregator,
    store: Arc<dyn SnapshotStore>,
    alerts: AlertEngine,
    dispatcher: Dispatcher,
    metrics: Arc<MetricsRecorder>,
    clock: Arc<dyn Clock>,
    gate: Arc<CommitGate>,
    checkpoint: bool,
    /// Keeps export and save paired so an older export never lands last.
    checkpoint_lock: Mutex<()>,
    sites: Vec<SiteConfig>,
    units: std::collections::HashMap<String, Unit>,
}

impl CycleRunner {
    pub fn new(
        config: &WattvaktConfig,
        registry: &CollectorRegistry,
        store: Arc<dyn SnapshotStore>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let aggregator = Aggregator::new(config, registry)?;
        let alerts = AlertEngine::new(&config.alerts, &config.sites)?;

        let checkpoint = config.store.checkpoint_alerts;
        if checkpoint {
            match store.load_alert_states() {
                Ok(states) if !states.is_empty() => {
                    let restored = alerts.restore_states(states);
                    info!(restored, "Restored alert states from checkpoint");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Alert checkpoint unreadable; starting with fresh state"),
            }
        }

        info!(
            sites = aggregator.sites().len(),
            rules = config.alerts.rules.len(),
            recovery = ?config.alerts.recovery,
            "Cycle runner ready"
        );

        Ok(Self {
            aggregator,
            store,
            alerts,
            dispatcher: Dispatcher::new(notifier),
            metrics,
            clock,
            gate: Arc::new(CommitGate::new()),
            checkpoint,
            checkpoint_lock: Mutex::new(()),
            sites: config.sites.clone(),
            units: summary::metric_units(&config.alerts.rules),
        })
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn gate(&self) -> &CommitGate {
        &self.gate
    }

    /// Collects every enabled site concurrently. A failing site never
    /// affects the others.
    #[instrument(skip_all)]
    pub async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        let started = Instant::now();
        let taken_at = self.clock.now();
        self.metrics.cycles.inc();
        info!(%taken_at, sites = self.aggregator.sites().len(), "Cycle started");

        let mut set = JoinSet::new();
        for site in self.aggregator.sites() {
            let runner = self.clone();
            let site = site.clone();
            set.spawn(async move { runner.run_site(&site, taken_at).await });
        }

        let mut sites = Vec::with_capacity(self.aggregator.sites().len());
        while let Some(result) = set.join_next().await {
            match result {
                Ok(outcome) => sites.push(outcome),
                Err(e) => error!(error = %e, "Site task failed"),
            }
        }
        sites.sort_by(|a, b| a.site_id.cmp(&b.site_id));

        let elapsed = started.elapsed();
        self.metrics.cycle_duration.observe(elapsed.as_secs_f64());
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            committed = sites.iter().filter(|s| s.committed).count(),
            "Cycle finished"
        );
        CycleReport { taken_at, sites }
    }

    #[instrument(skip_all, fields(site = %site.id()))]
    async fn run_site(&self, site: &SitePlan, taken_at: DateTime<Utc>) -> SiteOutcome {
        let mut outcome = SiteOutcome::new(site.id());

        let snapshot = tokio::select! {
            snapshot = site.collect(taken_at) => snapshot,
            _ = self.gate.closed() => {
                debug!("Shutdown requested; collection discarded");
                return outcome;
            }
        };
        for failure in &snapshot.failures {
            self.metrics.inc_source_failure(failure.status.as_str());
        }
        outcome.metrics = snapshot.metrics.len();
        outcome.failures = snapshot.failures.len();

        let committed = match self.gate.commit_blocking(self.store.clone(), snapshot).await {
            Ok(snapshot) => {
                self.metrics.snapshots_committed.inc();
                outcome.committed = true;
                EventLogger::log_event(
                    "snapshot_committed",
                    vec![
                        KeyValue::new("site", site.id().to_string()),
                        KeyValue::new("metrics", outcome.metrics as i64),
                    ],
                )
                .await;
                Some(snapshot)
            }
            Err(EngineError::Shutdown) => {
                debug!("Shutdown requested; snapshot discarded");
                return outcome;
            }
            Err(e) => {
                self.metrics.commit_failures.inc();
                error!(error = %e, "Snapshot commit failed; previous latest kept");
                None
            }
        };

        if self.gate.is_closed() {
            return outcome;
        }

        let last_data = self.store.latest_with_data(site.id());
        let notifications = self.alerts.evaluate(
            site.id(),
            committed.as_deref(),
            last_data.as_deref(),
            self.clock.now(),
        );
        outcome.alerts = notifications.len();
        for notification in notifications {
            self.deliver(notification).await;
        }

        if self.checkpoint {
            self.save_checkpoint();
        }
        outcome
    }

    fn save_checkpoint(&self) {
        let _paired = self.checkpoint_lock.lock();
        if let Err(e) = self.store.save_alert_states(&self.alerts.export_states()) {
            warn!(error = %e, "Failed to checkpoint alert states");
        }
    }

    /// The transition already happened; delivery only decides the record's
    /// `delivered` flag.
    async fn deliver(&self, notification: Notification) {
        let delivered = self
            .dispatcher
            .dispatch(
                &notification.site_id,
                &notification.rule_id,
                notification.severity,
                &notification.message,
            )
            .await;

        self.metrics.inc_alert(notification.severity.as_str());
        EventLogger::log_event(
            "alert_fired",
            vec![
                KeyValue::new("site", notification.site_id.clone()),
                KeyValue::new("rule", notification.rule_id.clone()),
                KeyValue::new("severity", notification.severity.as_str()),
            ],
        )
        .await;
        if !delivered {
            self.metrics.notification_failures.inc();
            EventLogger::log_event(
                "notification_failed",
                vec![KeyValue::new("rule", notification.rule_id.clone())],
            )
            .await;
        }

        if let Err(e) = self.store.record_alert(notification.to_record(delivered)) {
            warn!(error = %e, rule = %notification.rule_id, "Failed to record alert");
        }
    }

    /// Sends the daily digest. Returns whether the notifier accepted it.
    pub async fn send_summary(&self) -> bool {
        let text = summary::render(&self.sites, self.store.as_ref(), &self.units, self.clock.now());
        info!("Sending daily summary");
        self.dispatcher
            .dispatch(SUMMARY_SITE, SUMMARY_RULE, Severity::Info, &text)
            .await
    }
}
