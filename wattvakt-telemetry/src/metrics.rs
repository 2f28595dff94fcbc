//! ## wattvakt-telemetry::metrics
//! **Prometheus registry for cycle, store and alert counters**

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub cycles: Counter,
    pub cycles_skipped: Counter,
    pub cycle_duration: Histogram,
    pub source_failures: CounterVec,
    pub snapshots_committed: Counter,
    pub commit_failures: Counter,
    pub alerts_fired: CounterVec,
    pub notification_failures: Counter,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cycles = Counter::new("wattvakt_cycles_total", "Collection cycles started")?;
        let cycles_skipped = Counter::new(
            "wattvakt_cycles_skipped_total",
            "Ticks skipped because a cycle was still running",
        )?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new("wattvakt_cycle_duration_seconds", "Wall time per cycle")
                .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
        )?;
        let source_failures = CounterVec::new(
            Opts::new(
                "wattvakt_source_failures_total",
                "Source readings that were not ok",
            ),
            &["status"],
        )?;
        let snapshots_committed = Counter::new(
            "wattvakt_snapshots_committed_total",
            "Snapshots made visible in the store",
        )?;
        let commit_failures =
            Counter::new("wattvakt_commit_failures_total", "Snapshot commits that failed")?;
        let alerts_fired = CounterVec::new(
            Opts::new("wattvakt_alerts_fired_total", "Notifications emitted"),
            &["severity"],
        )?;
        let notification_failures = Counter::new(
            "wattvakt_notification_failures_total",
            "Notifications the sink did not accept",
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(cycles_skipped.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(source_failures.clone()))?;
        registry.register(Box::new(snapshots_committed.clone()))?;
        registry.register(Box::new(commit_failures.clone()))?;
        registry.register(Box::new(alerts_fired.clone()))?;
        registry.register(Box::new(notification_failures.clone()))?;

        Ok(Self {
            registry,
            cycles,
            cycles_skipped,
            cycle_duration,
            source_failures,
            snapshots_committed,
            commit_failures,
            alerts_fired,
            notification_failures,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn inc_source_failure(&self, status: &str) {
        self.source_failures.with_label_values(&[status]).inc();
    }

    pub fn inc_alert(&self, severity: &str) {
        self.alerts_fired.with_label_values(&[severity]).inc();
    }
}
