//! # wattvakt Configuration System
//!
//! Hierarchical configuration for the polling, aggregation and alerting engine.
//!
//! ## Features
//! - **Layered Sources**: defaults, base file, environment file, environment variables
//! - **Validation**: field-level checks through `validator`, plus cross-section
//!   consistency checks (rule references, chain sources, cadence vs. timeouts)

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod aggregator;
mod alerts;
mod error;
mod scheduler;
mod sites;
mod store;
mod telemetry;
mod validation;

pub use aggregator::{AggregatorConfig, MetricMergeConfig};
pub use alerts::{AlertsConfig, RecoveryMode, RuleConfig, StalenessConfig};
pub use error::ConfigError;
pub use scheduler::{SchedulerConfig, SummaryConfig};
pub use sites::{SiteConfig, SourceConfig};
pub use store::{StoreBackend, StoreConfig};
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/wattvakt.yaml";
const ENV_PREFIX: &str = "WATTVAKT_";

/// Top-level configuration container for all wattvakt components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct WattvaktConfig {
    /// Cycle cadence, shutdown bound, daily summary.
    #[validate(nested)]
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Source timeouts and metric fallback chains.
    #[validate(nested)]
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Monitored sites.
    #[validate(nested)]
    #[serde(default)]
    pub sites: Vec<SiteConfig>,

    /// Threshold rules and the staleness rule.
    #[validate(nested)]
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Snapshot persistence.
    #[validate(nested)]
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging parameters.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl WattvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/wattvakt.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - Environment-specific overrides (`WATTVAKT_ENV`).
    /// 4. `WATTVAKT_*` environment variables, `__` separating nested keys.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(WattvaktConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        } else {
            println!("{BASE_FILE} not found, using default configuration");
        }

        let env = std::env::var("WATTVAKT_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file, still honouring `WATTVAKT_*` overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment = Figment::from(Serialized::defaults(WattvaktConfig::default()))
            .merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                config.check_consistency()?;
                Ok(config)
            })
    }

    /// Cross-section checks that `validator` cannot express field by field.
    pub fn check_consistency(&self) -> Result<(), ConfigError> {
        let mut rule_ids = HashSet::new();
        for rule in &self.alerts.rules {
            if !rule_ids.insert(rule.id.as_str()) {
                return Err(inconsistent(format!("duplicate rule id '{}'", rule.id)));
            }
            if let Some(critical) = rule.critical {
                if !rule.comparator.breaches(critical, rule.threshold)
                    && critical != rule.threshold
                {
                    return Err(inconsistent(format!(
                        "rule '{}': critical threshold {} is less severe than {}",
                        rule.id, critical, rule.threshold
                    )));
                }
            }
        }

        let mut site_ids = HashSet::new();
        let mut known_sources = HashSet::new();
        let mut slowest_source = self.aggregator.source_timeout();
        for site in &self.sites {
            if !site_ids.insert(site.id.as_str()) {
                return Err(inconsistent(format!("duplicate site id '{}'", site.id)));
            }
            let mut names = HashSet::new();
            for source in &site.sources {
                if !names.insert(source.name.as_str()) {
                    return Err(inconsistent(format!(
                        "site '{}': duplicate source '{}'",
                        site.id, source.name
                    )));
                }
                known_sources.insert(source.name.as_str());
                slowest_source =
                    slowest_source.max(source.timeout(self.aggregator.source_timeout()));
            }
            if let Some(missing) = site.rules.iter().find(|id| !rule_ids.contains(id.as_str())) {
                return Err(inconsistent(format!(
                    "site '{}' references unknown rule '{}'",
                    site.id, missing
                )));
            }
        }

        for (metric, merge) in &self.aggregator.metrics {
            if merge.chain.is_empty() {
                return Err(inconsistent(format!("metric '{metric}' has an empty chain")));
            }
            if let Some(unknown) = merge
                .chain
                .iter()
                .find(|s| !known_sources.contains(s.as_str()))
            {
                return Err(inconsistent(format!(
                    "metric '{metric}' chain names unknown source '{unknown}'"
                )));
            }
        }

        if slowest_source >= self.scheduler.cadence() {
            return Err(inconsistent(format!(
                "source timeout {}s must be shorter than the cadence {}s",
                slowest_source.as_secs(),
                self.scheduler.cadence_secs
            )));
        }

        Ok(())
    }

    pub fn site(&self, id: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.id == id)
    }

    pub fn rule(&self, id: &str) -> Option<&RuleConfig> {
        self.alerts.rules.iter().find(|r| r.id == id)
    }
}

fn inconsistent(message: String) -> ConfigError {
    ConfigError::Inconsistent(message)
}
