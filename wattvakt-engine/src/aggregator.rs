//! Concurrent per-site collection.
//!
//! Every (site, source) pair owns a slot holding its collector and an
//! in-flight guard. A source whose previous call is still running (a collector
//! that blocked past its deadline) is reported as failed instead of being
//! started twice.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use wattvakt_collectors::{Collector, CollectorRegistry, SourceContext};
use wattvakt_config::{SiteConfig, WattvaktConfig};
use wattvakt_core::model::{Snapshot, SourceReading};

use crate::merge::{merge, MergePlan};
use crate::EngineError;

/// Extra time a collector gets past its deadline before its call is dropped.
const ABANDON_GRACE: Duration = Duration::from_millis(250);

struct SourceSlot {
    ctx: SourceContext,
    collector: Arc<dyn Collector>,
    timeout: Duration,
    in_flight: Arc<Mutex<()>>,
}

/// One enabled site with its collectors and merge rules.
pub struct SitePlan {
    pub site: SiteConfig,
    plan: MergePlan,
    slots: Vec<SourceSlot>,
}

impl SitePlan {
    pub fn id(&self) -> &str {
        &self.site.id
    }

    /// Runs every source concurrently and merges whatever came back.
    ///
    /// Always yields a snapshot, empty if every source failed.
    #[instrument(skip_all, fields(site = %self.site.id))]
    pub async fn collect(&self, taken_at: DateTime<Utc>) -> Snapshot {
        let start = Instant::now();
        let mut readings = Vec::with_capacity(self.slots.len());
        let mut pending = BTreeSet::new();
        let mut set = JoinSet::new();
        let mut last_deadline = start;

        for (idx, slot) in self.slots.iter().enumerate() {
            let deadline = start + slot.timeout;
            last_deadline = last_deadline.max(deadline);

            let Ok(guard) = slot.in_flight.clone().try_lock_owned() else {
                warn!(source = %slot.ctx.name(), "Previous collection still in flight");
                readings.push(SourceReading::error(
                    &self.site.id,
                    slot.ctx.name(),
                    Utc::now(),
                    "previous collection still in flight",
                ));
                continue;
            };

            let collector = slot.collector.clone();
            let ctx = slot.ctx.clone();
            let timeout = slot.timeout;
            pending.insert(idx);
            set.spawn(async move {
                let _guard = guard;
                let call = collector.collect(&ctx, deadline);
                let reading = match tokio::time::timeout_at(deadline + ABANDON_GRACE, call).await {
                    Ok(reading) => reading,
                    Err(_) => {
                        warn!(site = %ctx.site_id, source = %ctx.name(), "Collector ignored its deadline; abandoned");
                        SourceReading::timeout(&ctx.site_id, ctx.name(), Utc::now(), timeout)
                    }
                };
                (idx, reading)
            });
        }

        let hard_deadline = last_deadline + ABANDON_GRACE * 2;
        let mut abandoned = false;
        loop {
            match tokio::time::timeout_at(hard_deadline, set.join_next()).await {
                Ok(Some(Ok((idx, reading)))) => {
                    pending.remove(&idx);
                    readings.push(reading);
                }
                Ok(Some(Err(e))) => warn!(error = %e, "Collector task failed"),
                Ok(None) => break,
                Err(_) => {
                    set.abort_all();
                    abandoned = true;
                    break;
                }
            }
        }

        for idx in pending {
            let slot = &self.slots[idx];
            let reading = if abandoned {
                SourceReading::timeout(&self.site.id, slot.ctx.name(), Utc::now(), slot.timeout)
            } else {
                SourceReading::error(&self.site.id, slot.ctx.name(), Utc::now(), "collector task failed")
            };
            readings.push(reading);
        }

        let snapshot = merge(&self.site.id, taken_at, &readings, &self.plan);
        debug!(
            metrics = snapshot.metrics.len(),
            failures = snapshot.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Site collected"
        );
        snapshot
    }
}

/// Collectors and merge plans for every enabled site.
pub struct Aggregator {
    sites: Vec<Arc<SitePlan>>,
}

impl Aggregator {
    pub fn new(config: &WattvaktConfig, registry: &CollectorRegistry) -> Result<Self, EngineError> {
        let default_timeout = config.aggregator.source_timeout();
        let mut sites = Vec::new();

        for site in &config.sites {
            if !site.enabled {
                info!(site = %site.id, "Site disabled; skipping");
                continue;
            }

            let source_order: Vec<String> = site.sources.iter().map(|s| s.name.clone()).collect();
            let metrics = config
                .aggregator
                .metrics
                .iter()
                .filter(|(_, rule)| rule.chain.iter().any(|s| source_order.contains(s)))
                .map(|(metric, rule)| (metric.clone(), rule.clone()))
                .collect();

            let mut slots = Vec::with_capacity(site.sources.len());
            for source in &site.sources {
                let ctx = SourceContext::new(&site.id, source.clone());
                let collector = registry.build(&ctx).map_err(|error| EngineError::Registry {
                    site: site.id.clone(),
                    source: source.name.clone(),
                    error,
                })?;
                slots.push(SourceSlot {
                    ctx,
                    collector,
                    timeout: source.timeout(default_timeout),
                    in_flight: Arc::new(Mutex::new(())),
                });
            }

            sites.push(Arc::new(SitePlan {
                site: site.clone(),
                plan: MergePlan::new(metrics, source_order),
                slots,
            }));
        }

        Ok(Self { sites })
    }

    pub fn sites(&self) -> &[Arc<SitePlan>] {
        &self.sites
    }

    pub fn site(&self, site_id: &str) -> Option<&Arc<SitePlan>> {
        self.sites.iter().find(|s| s.id() == site_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wattvakt_config::{MetricMergeConfig, SourceConfig};
    use wattvakt_core::model::{ReadingStatus, Validity};

    /// Sleeps through its deadline without looking at it.
    struct Stubborn(Duration);

    #[async_trait]
    impl Collector for Stubborn {
        async fn collect(&self, ctx: &SourceContext, _deadline: Instant) -> SourceReading {
            tokio::time::sleep(self.0).await;
            SourceReading::ok(&ctx.site_id, ctx.name(), Utc::now(), BTreeMap::new())
        }
    }

    /// Takes a while but answers within its deadline; counts its calls.
    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Collector for Counting {
        async fn collect(&self, ctx: &SourceContext, _deadline: Instant) -> SourceReading {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(2)).await;
            let fields = BTreeMap::from([("power_to_user".to_string(), 640.0)]);
            SourceReading::ok(&ctx.site_id, ctx.name(), Utc::now(), fields)
        }
    }

    fn source(name: &str, kind: &str, settings: serde_json::Value) -> SourceConfig {
        SourceConfig {
            name: name.into(),
            kind: kind.into(),
            timeout_secs: None,
            settings: serde_json::from_value(settings).unwrap(),
        }
    }

    fn config(sources: Vec<SourceConfig>) -> WattvaktConfig {
        let mut config = WattvaktConfig::default();
        config.aggregator.source_timeout_secs = 5;
        config.aggregator.metrics.insert(
            "power_to_user".into(),
            MetricMergeConfig {
                chain: vec!["inverter".into(), "meter".into()],
                validity: Validity::Nonzero,
                strategy: Default::default(),
            },
        );
        config.sites.push(SiteConfig {
            id: "cabin".into(),
            name: None,
            enabled: true,
            sources,
            rules: Vec::new(),
        });
        config
    }

    fn registry() -> CollectorRegistry {
        let mut registry = CollectorRegistry::with_builtins();
        registry.register("stubborn", |_ctx| {
            Ok(Arc::new(Stubborn(Duration::from_secs(3600))) as Arc<dyn Collector>)
        });
        registry
    }

    fn taken_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_source_does_not_hold_back_the_snapshot() {
        let config = config(vec![
            source("inverter", "stubborn", serde_json::json!({})),
            source("meter", "static", serde_json::json!({ "metrics": { "power_to_user": 500.0 } })),
        ]);
        let aggregator = Aggregator::new(&config, &registry()).unwrap();

        let started = Instant::now();
        let snapshot = aggregator.sites()[0].collect(taken_at()).await;

        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(snapshot.metric("power_to_user"), Some(500.0));
        assert_eq!(snapshot.provenance("power_to_user"), Some("meter"));
        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].status, ReadingStatus::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn every_source_failing_still_yields_a_snapshot() {
        let config = config(vec![
            source("inverter", "stubborn", serde_json::json!({})),
            source("meter", "static", serde_json::json!({ "fail": "maintenance" })),
        ]);
        let aggregator = Aggregator::new(&config, &registry()).unwrap();
        let snapshot = aggregator.sites()[0].collect(taken_at()).await;
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.failures.len(), 2);
        assert_eq!(snapshot.taken_at, taken_at());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_collect_does_not_start_a_source_twice() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = registry();
        let counter = calls.clone();
        registry.register("counting", move |_ctx| {
            Ok(Arc::new(Counting(counter.clone())) as Arc<dyn Collector>)
        });
        let config = config(vec![source("inverter", "counting", serde_json::json!({}))]);
        let aggregator = Aggregator::new(&config, &registry).unwrap();
        let plan = &aggregator.sites()[0];

        let (a, b) = tokio::join!(plan.collect(taken_at()), plan.collect(taken_at()));
        let (first, second) = if a.is_empty() { (b, a) } else { (a, b) };

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.metric("power_to_user"), Some(640.0));
        assert!(first.failures.is_empty());

        assert!(second.is_empty());
        assert_eq!(second.failures.len(), 1);
        assert_eq!(second.failures[0].source, "inverter");
        assert_eq!(second.failures[0].status, ReadingStatus::Error);
        assert_eq!(
            second.failures[0].reason.as_deref(),
            Some("previous collection still in flight")
        );

        // The guard is released once the first call finishes.
        let third = plan.collect(taken_at()).await;
        assert_eq!(third.metric("power_to_user"), Some(640.0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_kind_is_a_setup_error() {
        let config = config(vec![source("inverter", "modbus", serde_json::json!({}))]);
        let err = Aggregator::new(&config, &registry()).err().unwrap();
        assert!(matches!(err, EngineError::Registry { ref source, .. } if source == "inverter"));
    }

    #[test]
    fn disabled_sites_are_not_planned() {
        let mut config = config(vec![source("meter", "static", serde_json::json!({}))]);
        config.sites[0].enabled = false;
        let aggregator = Aggregator::new(&config, &registry()).unwrap();
        assert!(aggregator.sites().is_empty());
    }
}
