use std::time::Duration;

use async_trait::async_trait;

use crate::source::{MetricSource, Metrics, SourceContext};
use crate::CollectorError;

/// Reports fixed values from its settings.
///
/// ```yaml
/// kind: static
/// settings:
///   metrics: { soc: 87.5, voltage: 53.1 }
///   delay_ms: 250      # optional
///   fail: "maintenance" # optional, always fail with this reason
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StaticSource {
    metrics: Metrics,
    delay: Option<Duration>,
    fail: Option<String>,
}

impl StaticSource {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
            delay: None,
            fail: None,
        }
    }

    pub fn from_context(ctx: &SourceContext) -> Result<Self, CollectorError> {
        let mut metrics = Metrics::new();
        if let Some(value) = ctx.setting("metrics") {
            let table = value
                .as_object()
                .ok_or_else(|| ctx.invalid("'metrics' must be a table"))?;
            for (name, v) in table {
                let number = v
                    .as_f64()
                    .ok_or_else(|| ctx.invalid(format!("metric '{name}' is not a number")))?;
                metrics.insert(name.clone(), number);
            }
        }

        let delay = match ctx.setting("delay_ms") {
            Some(v) => Some(Duration::from_millis(
                v.as_u64()
                    .ok_or_else(|| ctx.invalid("'delay_ms' must be a positive integer"))?,
            )),
            None => None,
        };

        let fail = ctx
            .setting("fail")
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        Ok(Self {
            metrics,
            delay,
            fail,
        })
    }
}

#[async_trait]
impl MetricSource for StaticSource {
    async fn fetch(&self, _ctx: &SourceContext) -> Result<Metrics, CollectorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail {
            Some(reason) => Err(CollectorError::Unavailable(reason.clone())),
            None => Ok(self.metrics.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wattvakt_config::SourceConfig;

    fn ctx(settings: serde_json::Value) -> SourceContext {
        let settings: BTreeMap<String, serde_json::Value> = serde_json::from_value(settings).unwrap();
        SourceContext::new(
            "cabin",
            SourceConfig {
                name: "bench".into(),
                kind: "static".into(),
                timeout_secs: None,
                settings,
            },
        )
    }

    #[tokio::test]
    async fn reports_configured_metrics() {
        let ctx = ctx(json!({ "metrics": { "soc": 87.5, "load": 1152 } }));
        let source = StaticSource::from_context(&ctx).unwrap();
        let metrics = source.fetch(&ctx).await.unwrap();
        assert_eq!(metrics["soc"], 87.5);
        assert_eq!(metrics["load"], 1152.0);
    }

    #[test]
    fn rejects_non_numeric_metric() {
        let ctx = ctx(json!({ "metrics": { "soc": "high" } }));
        assert!(StaticSource::from_context(&ctx).is_err());
    }

    #[tokio::test]
    async fn configured_failure() {
        let ctx = ctx(json!({ "fail": "maintenance" }));
        let source = StaticSource::from_context(&ctx).unwrap();
        let err = source.fetch(&ctx).await.unwrap_err();
        assert!(matches!(err, CollectorError::Unavailable(r) if r == "maintenance"));
    }
}
