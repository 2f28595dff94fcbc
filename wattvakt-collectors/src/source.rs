//! The collector contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use wattvakt_config::SourceConfig;
use wattvakt_core::model::SourceReading;

use crate::CollectorError;

/// Metric name to value, as one source reports it.
pub type Metrics = BTreeMap<String, f64>;

/// Which site a collector serves and how its source is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceContext {
    pub site_id: String,
    pub source: SourceConfig,
}

impl SourceContext {
    pub fn new(site_id: impl Into<String>, source: SourceConfig) -> Self {
        Self {
            site_id: site_id.into(),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.source.settings.get(key)
    }

    pub fn invalid(&self, reason: impl Into<String>) -> CollectorError {
        CollectorError::InvalidSettings {
            kind: self.source.kind.clone(),
            reason: reason.into(),
        }
    }
}

/// Capability every telemetry source provides.
///
/// `collect` never fails: any problem comes back as a reading with status
/// `error` or `timeout`. It must return by `deadline`.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, ctx: &SourceContext, deadline: Instant) -> SourceReading;
}

/// The fallible half of a collector. Wrap it in [`SourceCollector`] to get a
/// [`Collector`] that honours deadlines and never raises.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch(&self, ctx: &SourceContext) -> Result<Metrics, CollectorError>;
}

#[async_trait]
impl<T: MetricSource + ?Sized> MetricSource for Arc<T> {
    async fn fetch(&self, ctx: &SourceContext) -> Result<Metrics, CollectorError> {
        (**self).fetch(ctx).await
    }
}

pub struct SourceCollector<S> {
    source: S,
}

impl<S: MetricSource> SourceCollector<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn inner(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: MetricSource> Collector for SourceCollector<S> {
    #[instrument(skip_all, fields(site = %ctx.site_id, source = %ctx.name()))]
    async fn collect(&self, ctx: &SourceContext, deadline: Instant) -> SourceReading {
        let budget = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout_at(deadline, self.source.fetch(ctx)).await {
            Ok(Ok(fields)) => {
                debug!(site = %ctx.site_id, source = %ctx.name(), fields = fields.len(), "Source collected");
                SourceReading::ok(&ctx.site_id, ctx.name(), Utc::now(), fields)
            }
            Ok(Err(CollectorError::Timeout(after))) => {
                warn!(site = %ctx.site_id, source = %ctx.name(), "Source reported timeout");
                SourceReading::timeout(&ctx.site_id, ctx.name(), Utc::now(), after)
            }
            Ok(Err(e)) => {
                warn!(site = %ctx.site_id, source = %ctx.name(), error = %e, "Source failed");
                SourceReading::error(&ctx.site_id, ctx.name(), Utc::now(), e.to_string())
            }
            Err(_) => {
                warn!(site = %ctx.site_id, source = %ctx.name(), "Source missed its deadline");
                SourceReading::timeout(&ctx.site_id, ctx.name(), Utc::now(), budget)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wattvakt_core::model::ReadingStatus;

    struct Slow;

    #[async_trait]
    impl MetricSource for Slow {
        async fn fetch(&self, _ctx: &SourceContext) -> Result<Metrics, CollectorError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Metrics::new())
        }
    }

    struct Broken;

    #[async_trait]
    impl MetricSource for Broken {
        async fn fetch(&self, _ctx: &SourceContext) -> Result<Metrics, CollectorError> {
            Err(CollectorError::Network("connection refused".into()))
        }
    }

    fn ctx() -> SourceContext {
        SourceContext::new(
            "cabin",
            SourceConfig {
                name: "shunt".into(),
                kind: "test".into(),
                timeout_secs: None,
                settings: BTreeMap::new(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_timeout_reading() {
        let collector = SourceCollector::new(Slow);
        let deadline = Instant::now() + Duration::from_secs(10);
        let reading = collector.collect(&ctx(), deadline).await;
        assert_eq!(reading.status, ReadingStatus::Timeout);
        assert_eq!(reading.source, "shunt");
    }

    #[tokio::test]
    async fn error_is_folded_into_reading() {
        let collector = SourceCollector::new(Broken);
        let deadline = Instant::now() + Duration::from_secs(10);
        let reading = collector.collect(&ctx(), deadline).await;
        assert_eq!(reading.status, ReadingStatus::Error);
        assert_eq!(
            reading.error.as_deref(),
            Some("Network error: connection refused")
        );
    }
}
