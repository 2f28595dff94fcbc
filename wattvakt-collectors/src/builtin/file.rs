use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::source::{MetricSource, Metrics, SourceContext};
use crate::CollectorError;

/// Reads a JSON object of `metric: number` written by an external agent.
///
/// Non-numeric members are ignored. With `max_age_secs` set, a file whose
/// modification time is older than that is reported as unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    path: PathBuf,
    max_age: Option<Duration>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, max_age: Option<Duration>) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn from_context(ctx: &SourceContext) -> Result<Self, CollectorError> {
        let path = ctx
            .setting("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ctx.invalid("'path' is required"))?;
        let max_age = match ctx.setting("max_age_secs") {
            Some(v) => Some(Duration::from_secs(
                v.as_u64()
                    .ok_or_else(|| ctx.invalid("'max_age_secs' must be a positive integer"))?,
            )),
            None => None,
        };
        Ok(Self::new(path, max_age))
    }
}

#[async_trait]
impl MetricSource for FileSource {
    async fn fetch(&self, _ctx: &SourceContext) -> Result<Metrics, CollectorError> {
        if let Some(max_age) = self.max_age {
            let modified = tokio::fs::metadata(&self.path).await?.modified()?;
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO);
            if age > max_age {
                return Err(CollectorError::Unavailable(format!(
                    "{} not updated for {}s",
                    self.path.display(),
                    age.as_secs()
                )));
            }
        }

        let raw = tokio::fs::read(&self.path).await?;
        let document: serde_json::Value = serde_json::from_slice(&raw)?;
        let object = document
            .as_object()
            .ok_or_else(|| CollectorError::Unavailable("payload is not a JSON object".into()))?;

        Ok(object
            .iter()
            .filter_map(|(name, v)| v.as_f64().map(|n| (name.clone(), n)))
            .collect())
    }
}
