//! Fallback-chain merge of one cycle's readings into a snapshot.
//!
//! `merge` is a pure function of the reading set: readings are indexed by
//! source name before anything else happens, so the order in which collectors
//! finished never shows up in the result.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use wattvakt_config::MetricMergeConfig;
use wattvakt_core::model::{
    MergeStrategy, ReadingStatus, Snapshot, SourceFailure, SourceReading, Validity,
};

/// Per-site merge rules: configured chains plus the site's source order,
/// which is the chain for any metric nobody configured.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub metrics: BTreeMap<String, MetricMergeConfig>,
    pub source_order: Vec<String>,
}

impl MergePlan {
    pub fn new(metrics: BTreeMap<String, MetricMergeConfig>, source_order: Vec<String>) -> Self {
        Self {
            metrics,
            source_order,
        }
    }
}

pub fn merge(
    site_id: &str,
    taken_at: DateTime<Utc>,
    readings: &[SourceReading],
    plan: &MergePlan,
) -> Snapshot {
    let mut by_source: HashMap<&str, &SourceReading> = HashMap::with_capacity(readings.len());
    for reading in readings {
        by_source
            .entry(reading.source.as_str())
            .and_modify(|kept| {
                if preference(reading, kept) == Ordering::Greater {
                    *kept = reading;
                }
            })
            .or_insert(reading);
    }

    let mut snapshot = Snapshot::new(site_id, taken_at);

    for (metric, rule) in &plan.metrics {
        resolve(&mut snapshot, metric, &rule.chain, rule.validity, rule.strategy, &by_source);
    }

    let implicit: BTreeSet<&str> = by_source
        .values()
        .filter(|r| r.is_ok())
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .filter(|m| !plan.metrics.contains_key(*m))
        .collect();
    for metric in implicit {
        resolve(
            &mut snapshot,
            metric,
            &plan.source_order,
            Validity::Any,
            MergeStrategy::FirstValid,
            &by_source,
        );
    }

    let mut failures: Vec<SourceFailure> = by_source
        .values()
        .filter(|r| r.status != ReadingStatus::Ok)
        .map(|r| SourceFailure {
            source: r.source.clone(),
            status: r.status,
            reason: r.error.clone(),
        })
        .collect();
    failures.sort_by(|a, b| a.source.cmp(&b.source));
    snapshot.failures = failures;

    snapshot
}

/// Total order used when one source reported more than once: an ok reading
/// beats a failed one, then the newer one wins, then the content decides.
fn preference(a: &SourceReading, b: &SourceReading) -> Ordering {
    a.is_ok()
        .cmp(&b.is_ok())
        .then(a.collected_at.cmp(&b.collected_at))
        .then_with(|| compare_fields(&a.fields, &b.fields))
        .then_with(|| a.status.as_str().cmp(b.status.as_str()))
        .then_with(|| a.error.cmp(&b.error))
}

fn compare_fields(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b) {
        match ka.cmp(kb).then(va.total_cmp(vb)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn resolve(
    snapshot: &mut Snapshot,
    metric: &str,
    chain: &[String],
    validity: Validity,
    strategy: MergeStrategy,
    by_source: &HashMap<&str, &SourceReading>,
) {
    let mut candidates = chain.iter().filter_map(|source| {
        let value = by_source.get(source.as_str())?.value(metric)?;
        validity.accepts(value).then_some((source.as_str(), value))
    });

    let merged = match strategy {
        MergeStrategy::FirstValid => candidates.next().map(|(s, v)| (v, s.to_string())),
        MergeStrategy::Sum => {
            let valid: Vec<(&str, f64)> = candidates.collect();
            (!valid.is_empty()).then(|| {
                let total: f64 = valid.iter().map(|(_, v)| v).sum();
                let provenance = valid.iter().map(|(s, _)| *s).collect::<Vec<_>>().join("+");
                (total, provenance)
            })
        }
    };

    match merged {
        Some((value, source)) => {
            if let Err(e) = snapshot.insert_metric(metric, value, source) {
                debug!(site = %snapshot.site_id, metric, error = %e, "Dropping merged value");
            }
        }
        None => debug!(site = %snapshot.site_id, metric, "No valid candidate; metric omitted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn ok(source: &str, fields: &[(&str, f64)]) -> SourceReading {
        SourceReading::ok(
            "cabin",
            source,
            t0(),
            fields.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
    }

    fn plan(chain: &[&str], validity: Validity, strategy: MergeStrategy) -> MergePlan {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "power_to_user".to_string(),
            MetricMergeConfig {
                chain: chain.iter().map(|s| s.to_string()).collect(),
                validity,
                strategy,
            },
        );
        MergePlan::new(metrics, chain.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn zero_falls_through_to_next_candidate() {
        let plan = plan(&["a", "b"], Validity::Nonzero, MergeStrategy::FirstValid);
        let readings = [ok("a", &[("power_to_user", 0.0)]), ok("b", &[("power_to_user", 500.0)])];
        let s = merge("cabin", t0(), &readings, &plan);
        assert_eq!(s.metric("power_to_user"), Some(500.0));
        assert_eq!(s.provenance("power_to_user"), Some("b"));
    }

    #[test]
    fn first_valid_candidate_wins_regardless_of_later_ones() {
        let plan = plan(&["a", "b"], Validity::Nonzero, MergeStrategy::FirstValid);
        let readings = [ok("b", &[("power_to_user", 500.0)]), ok("a", &[("power_to_user", 1152.0)])];
        let s = merge("cabin", t0(), &readings, &plan);
        assert_eq!(s.metric("power_to_user"), Some(1152.0));
        assert_eq!(s.provenance("power_to_user"), Some("a"));
    }

    #[test]
    fn no_valid_candidate_leaves_metric_absent() {
        let plan = plan(&["a", "b"], Validity::Nonzero, MergeStrategy::FirstValid);
        let readings = [
            ok("a", &[("power_to_user", 0.0)]),
            SourceReading::timeout("cabin", "b", t0(), Duration::from_secs(10)),
        ];
        let s = merge("cabin", t0(), &readings, &plan);
        assert!(s.metric("power_to_user").is_none());
        assert!(s.is_empty());
        assert_eq!(s.failures.len(), 1);
        assert_eq!(s.failures[0].status, ReadingStatus::Timeout);
    }

    #[test]
    fn failed_reading_is_skipped_even_with_fields() {
        let plan = plan(&["a", "b"], Validity::Any, MergeStrategy::FirstValid);
        let mut broken = ok("a", &[("power_to_user", 42.0)]);
        broken.status = ReadingStatus::Error;
        let readings = [broken, ok("b", &[("power_to_user", 7.0)])];
        let s = merge("cabin", t0(), &readings, &plan);
        assert_eq!(s.metric("power_to_user"), Some(7.0));
    }

    #[test]
    fn sum_strategy_adds_valid_candidates() {
        let plan = plan(&["a", "b", "c"], Validity::NonNegative, MergeStrategy::Sum);
        let readings = [
            ok("a", &[("power_to_user", 300.0)]),
            ok("b", &[("power_to_user", -5.0)]),
            ok("c", &[("power_to_user", 200.0)]),
        ];
        let s = merge("cabin", t0(), &readings, &plan);
        assert_eq!(s.metric("power_to_user"), Some(500.0));
        assert_eq!(s.provenance("power_to_user"), Some("a+c"));
    }

    #[test]
    fn unconfigured_metric_uses_site_source_order() {
        let plan = plan(&["a", "b"], Validity::Nonzero, MergeStrategy::FirstValid);
        let readings = [ok("b", &[("soc", 81.0)]), ok("a", &[("soc", 0.0)])];
        let s = merge("cabin", t0(), &readings, &plan);
        assert_eq!(s.metric("soc"), Some(0.0));
        assert_eq!(s.provenance("soc"), Some("a"));
    }

    #[test]
    fn repeated_source_keeps_newest_ok_reading() {
        let plan = plan(&["a"], Validity::Any, MergeStrategy::FirstValid);
        let older = ok("a", &[("power_to_user", 300.0)]);
        let mut newer = ok("a", &[("power_to_user", 450.0)]);
        newer.collected_at = t0() + chrono::TimeDelta::seconds(5);
        let failed = SourceReading::error("cabin", "a", t0() + chrono::TimeDelta::seconds(9), "refused");

        for readings in [
            [older.clone(), newer.clone(), failed.clone()],
            [failed.clone(), newer.clone(), older.clone()],
            [newer.clone(), failed, older],
        ] {
            let s = merge("cabin", t0(), &readings, &plan);
            assert_eq!(s.metric("power_to_user"), Some(450.0));
            assert!(s.failures.is_empty());
        }
    }

    fn reading_set() -> impl Strategy<Value = Vec<SourceReading>> {
        prop::collection::vec(
            (
                any::<bool>(),
                prop::collection::btree_map("power_to_user|soc|pv", -5.0f64..5.0, 0..3),
            ),
            4,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (healthy, fields))| {
                    if healthy {
                        SourceReading::ok("cabin", format!("s{i}"), t0(), fields)
                    } else {
                        SourceReading::error("cabin", format!("s{i}"), t0(), "refused")
                    }
                })
                .collect()
        })
    }

    fn repeated_readings() -> impl Strategy<Value = Vec<SourceReading>> {
        prop::collection::vec(
            (
                0..2usize,
                0..3i64,
                any::<bool>(),
                prop::collection::btree_map("power_to_user|soc", -5.0f64..5.0, 0..3),
            ),
            2..6,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(source, second, healthy, fields)| {
                    let at = t0() + chrono::TimeDelta::seconds(second);
                    if healthy {
                        SourceReading::ok("cabin", format!("s{source}"), at, fields)
                    } else {
                        SourceReading::error("cabin", format!("s{source}"), at, "refused")
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn repeated_sources_merge_the_same_in_any_order(
            (readings, shuffled) in repeated_readings()
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let plan = plan(&["s0", "s1"], Validity::Nonzero, MergeStrategy::FirstValid);
            let a = merge("cabin", t0(), &readings, &plan);
            let b = merge("cabin", t0(), &shuffled, &plan);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn merge_ignores_completion_order(
            (readings, shuffled) in reading_set()
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let mut metrics = BTreeMap::new();
            metrics.insert("power_to_user".to_string(), MetricMergeConfig {
                chain: vec!["s2".into(), "s0".into(), "s3".into()],
                validity: Validity::Nonzero,
                strategy: MergeStrategy::FirstValid,
            });
            metrics.insert("pv".to_string(), MetricMergeConfig {
                chain: vec!["s0".into(), "s1".into(), "s2".into(), "s3".into()],
                validity: Validity::Positive,
                strategy: MergeStrategy::Sum,
            });
            let plan = MergePlan::new(metrics, (0..4).map(|i| format!("s{i}")).collect());

            let a = merge("cabin", t0(), &readings, &plan);
            let b = merge("cabin", t0(), &shuffled, &plan);
            prop_assert_eq!(a, b);
        }
    }
}
