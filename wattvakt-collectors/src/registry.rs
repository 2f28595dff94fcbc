//! Configuration-driven lookup from a source `kind` to a collector.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtin::{FileSource, StaticSource};
use crate::source::{Collector, SourceCollector, SourceContext};
use crate::CollectorError;

/// Builds one collector instance for one (site, source) pair.
pub type CollectorFactory =
    Arc<dyn Fn(&SourceContext) -> Result<Arc<dyn Collector>, CollectorError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct CollectorRegistry {
    factories: HashMap<String, CollectorFactory>,
}

impl CollectorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the generic collectors: `static` and `file`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("static", |ctx| {
            Ok(Arc::new(SourceCollector::new(StaticSource::from_context(ctx)?)) as Arc<dyn Collector>)
        });
        registry.register("file", |ctx| {
            Ok(Arc::new(SourceCollector::new(FileSource::from_context(ctx)?)) as Arc<dyn Collector>)
        });
        registry
    }

    /// Adds or replaces the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&SourceContext) -> Result<Arc<dyn Collector>, CollectorError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn build(&self, ctx: &SourceContext) -> Result<Arc<dyn Collector>, CollectorError> {
        let factory = self
            .factories
            .get(&ctx.source.kind)
            .ok_or_else(|| CollectorError::UnknownKind(ctx.source.kind.clone()))?;
        factory(ctx)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
