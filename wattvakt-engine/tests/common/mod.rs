#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tokio::time::Instant;

use wattvakt_collectors::{Collector, CollectorRegistry, SourceContext};
use wattvakt_config::{RuleConfig, SiteConfig, SourceConfig, StoreBackend, WattvaktConfig};
use wattvakt_core::model::{
    AlertRecord, AlertStateEntry, Comparator, Severity, Snapshot, SourceReading, Unit,
};
use wattvakt_core::time::Clock;
use wattvakt_engine::CycleRunner;
use wattvakt_notify::{Notifier, NotifyError};
use wattvakt_store::{MemoryStore, SnapshotStore, StoreError};
use wattvakt_telemetry::MetricsRecorder;

/// Wall clock that follows tokio's (possibly paused) timer.
pub struct TokioClock {
    base: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + TimeDelta::from_std(self.origin.elapsed()).unwrap()
    }
}

pub fn midnight() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Ignores its deadline entirely.
pub struct Stubborn;

#[async_trait]
impl Collector for Stubborn {
    async fn collect(&self, ctx: &SourceContext, _deadline: Instant) -> SourceReading {
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        SourceReading::ok(&ctx.site_id, ctx.name(), Utc::now(), BTreeMap::new())
    }
}

pub fn registry() -> CollectorRegistry {
    let mut registry = CollectorRegistry::with_builtins();
    registry.register("stubborn", |_ctx| Ok(Arc::new(Stubborn) as Arc<dyn Collector>));
    registry
}

pub fn static_source(name: &str, settings: serde_json::Value) -> SourceConfig {
    SourceConfig {
        name: name.into(),
        kind: "static".into(),
        timeout_secs: None,
        settings: serde_json::from_value(settings).unwrap(),
    }
}

pub fn file_source(name: &str, path: &std::path::Path) -> SourceConfig {
    SourceConfig {
        name: name.into(),
        kind: "file".into(),
        timeout_secs: None,
        settings: serde_json::from_value(serde_json::json!({ "path": path })).unwrap(),
    }
}

pub fn stubborn_source(name: &str) -> SourceConfig {
    SourceConfig {
        name: name.into(),
        kind: "stubborn".into(),
        timeout_secs: None,
        settings: BTreeMap::new(),
    }
}

pub fn site(id: &str, sources: Vec<SourceConfig>, rules: &[&str]) -> SiteConfig {
    SiteConfig {
        id: id.into(),
        name: None,
        enabled: true,
        sources,
        rules: rules.iter().map(|r| r.to_string()).collect(),
    }
}

pub fn low_soc_rule() -> RuleConfig {
    RuleConfig {
        id: "low-soc".into(),
        metric: "soc".into(),
        comparator: Comparator::Lt,
        threshold: 20.0,
        critical: None,
        cooldown_secs: 120 * 60,
        severity: Severity::Medium,
        unit: Unit::Percent,
        enabled: true,
    }
}

pub fn config(sites: Vec<SiteConfig>) -> WattvaktConfig {
    let mut config = WattvaktConfig::default();
    config.store.backend = StoreBackend::Memory;
    config.store.checkpoint_alerts = false;
    config.aggregator.source_timeout_secs = 10;
    config.alerts.rules.push(low_soc_rule());
    config.sites = sites;
    config
}

pub fn runner(
    config: &WattvaktConfig,
    store: Arc<dyn SnapshotStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
) -> Arc<CycleRunner> {
    let metrics = Arc::new(MetricsRecorder::new().unwrap());
    Arc::new(CycleRunner::new(config, &registry(), store, notifier, metrics, clock).unwrap())
}

/// Memory store whose commits can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SnapshotStore for FlakyStore {
    fn commit(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.commit(snapshot)
    }

    fn get_latest(&self, site_id: &str) -> Option<Arc<Snapshot>> {
        self.inner.get_latest(site_id)
    }

    fn latest_with_data(&self, site_id: &str) -> Option<Arc<Snapshot>> {
        self.inner.latest_with_data(site_id)
    }

    fn get_range(&self, site_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Snapshot> {
        self.inner.get_range(site_id, start, end)
    }

    fn sites(&self) -> Vec<String> {
        self.inner.sites()
    }

    fn record_alert(&self, record: AlertRecord) -> Result<(), StoreError> {
        self.inner.record_alert(record)
    }

    fn recent_alerts(&self, since: DateTime<Utc>) -> Vec<AlertRecord> {
        self.inner.recent_alerts(since)
    }

    fn save_alert_states(&self, states: &[AlertStateEntry]) -> Result<(), StoreError> {
        self.inner.save_alert_states(states)
    }

    fn load_alert_states(&self) -> Result<Vec<AlertStateEntry>, StoreError> {
        self.inner.load_alert_states()
    }
}

pub struct RefusingNotifier;

#[async_trait]
impl Notifier for RefusingNotifier {
    async fn send(&self, _: &str, _: &str, _: Severity, _: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("gateway unreachable".into()))
    }
}

pub struct HangingNotifier;

#[async_trait]
impl Notifier for HangingNotifier {
    async fn send(&self, _: &str, _: &str, _: Severity, _: &str) -> Result<(), NotifyError> {
        std::future::pending().await
    }
}

/// Waits before handing the message on.
pub struct SlowNotifier<N> {
    inner: N,
    delay: Duration,
}

impl<N> SlowNotifier<N> {
    pub fn new(inner: N, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<N: Notifier> Notifier for SlowNotifier<N> {
    async fn send(
        &self,
        site_id: &str,
        rule_id: &str,
        severity: Severity,
        message: &str,
    ) -> Result<(), NotifyError> {
        tokio::time::sleep(self.delay).await;
        self.inner.send(site_id, rule_id, severity, message).await
    }
}
