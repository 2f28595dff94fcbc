//! Daily digest of every site's latest snapshot.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};

use wattvakt_alerts::format::format_value;
use wattvakt_config::{RuleConfig, SiteConfig, SummaryConfig};
use wattvakt_core::model::Unit;
use wattvakt_store::SnapshotStore;

pub const SUMMARY_SITE: &str = "*";
pub const SUMMARY_RULE: &str = "daily_summary";

/// Next instant, strictly after `now`, at which the configured local time occurs.
pub fn next_run(now: DateTime<Utc>, config: &SummaryConfig) -> Option<DateTime<Utc>> {
    let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60)?;
    let time = config.local_time()?;
    let local_now = now.with_timezone(&offset);

    let mut date = local_now.date_naive();
    for _ in 0..2 {
        let candidate = date.and_time(time).and_local_timezone(offset).single()?;
        if candidate > local_now {
            return Some(candidate.with_timezone(&Utc));
        }
        date = date.succ_opt()?;
    }
    None
}

/// Display unit per metric, taken from the first rule that names it.
pub fn metric_units(rules: &[RuleConfig]) -> HashMap<String, Unit> {
    let mut units = HashMap::new();
    for rule in rules {
        units.entry(rule.metric.clone()).or_insert(rule.unit);
    }
    units
}

pub fn render(
    sites: &[SiteConfig],
    store: &dyn SnapshotStore,
    units: &HashMap<String, Unit>,
    now: DateTime<Utc>,
) -> String {
    let mut lines = vec![format!("Daily summary {}", now.format("%Y-%m-%d"))];

    for site in sites.iter().filter(|s| s.enabled) {
        let line = match store.get_latest(&site.id) {
            None => format!("{}: no data", site.display_name()),
            Some(snapshot) if snapshot.is_empty() => {
                format!("{}: no metrics (all sources failed)", site.display_name())
            }
            Some(snapshot) => {
                let metrics: Vec<String> = snapshot
                    .metrics
                    .iter()
                    .map(|(name, m)| {
                        let unit = units.get(name).copied().unwrap_or_default();
                        format!("{name} {}", format_value(m.value, unit))
                    })
                    .collect();
                format!("{}: {}", site.display_name(), metrics.join(", "))
            }
        };
        lines.push(line);
    }

    let alerts = store.recent_alerts(now - TimeDelta::hours(24)).len();
    lines.push(format!("Alerts in the last 24h: {alerts}"));
    lines.join("\n")
}
