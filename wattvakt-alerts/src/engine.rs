use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use wattvakt_config::{AlertsConfig, RecoveryMode, SiteConfig};
use wattvakt_core::model::{
    AlertKey, AlertPhase, AlertRecord, AlertState, AlertStateEntry, Severity, Snapshot,
};

use crate::rules::{CompiledRule, Condition};
use crate::state::{step, Transition};
use crate::AlertError;

/// A notification the engine wants delivered. The state transition that
/// produced it has already happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub site_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub fired_at: DateTime<Utc>,
}

impl Notification {
    pub fn to_record(&self, delivered: bool) -> AlertRecord {
        AlertRecord {
            site_id: self.site_id.clone(),
            rule_id: self.rule_id.clone(),
            severity: self.severity,
            value: self.value,
            threshold: self.threshold,
            message: self.message.clone(),
            fired_at: self.fired_at,
            delivered,
        }
    }
}

struct SiteRules {
    name: String,
    rules: Vec<Arc<CompiledRule>>,
}

/// Owns every (site, rule) state. States are created on first evaluation.
///
/// Evaluation of one site holds that site's lock for the whole pass, so a
/// (site, rule) pair is never evaluated re-entrantly. Different sites do not
/// contend.
pub struct AlertEngine {
    recovery: RecoveryMode,
    staleness: Option<Arc<CompiledRule>>,
    sites: HashMap<String, SiteRules>,
    states: RwLock<HashMap<String, Arc<Mutex<BTreeMap<String, AlertState>>>>>,
}

impl AlertEngine {
    pub fn new(config: &AlertsConfig, sites: &[SiteConfig]) -> Result<Self, AlertError> {
        let rules: HashMap<&str, Arc<CompiledRule>> = config
            .rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| (r.id.as_str(), Arc::new(CompiledRule::from_config(r))))
            .collect();
        let known: Vec<&str> = config.rules.iter().map(|r| r.id.as_str()).collect();

        let mut by_site = HashMap::new();
        for site in sites {
            let mut site_rules = Vec::new();
            for id in &site.rules {
                if !known.contains(&id.as_str()) {
                    return Err(AlertError::UnknownRule(id.clone()));
                }
                if let Some(rule) = rules.get(id.as_str()) {
                    site_rules.push(rule.clone());
                }
            }
            by_site.insert(
                site.id.clone(),
                SiteRules {
                    name: site.display_name().to_string(),
                    rules: site_rules,
                },
            );
        }

        Ok(Self {
            recovery: config.recovery,
            staleness: config
                .staleness
                .enabled
                .then(|| Arc::new(CompiledRule::staleness(&config.staleness))),
            sites: by_site,
            states: RwLock::new(HashMap::new()),
        })
    }

    pub fn recovery(&self) -> RecoveryMode {
        self.recovery
    }

    fn site_states(&self, site_id: &str) -> Arc<Mutex<BTreeMap<String, AlertState>>> {
        if let Some(states) = self.states.read().get(site_id) {
            return states.clone();
        }
        self.states
            .write()
            .entry(site_id.to_string())
            .or_default()
            .clone()
    }

    /// Runs every rule for `site_id`.
    ///
    /// `snapshot` is this cycle's committed snapshot (`None` if the commit
    /// failed); threshold rules only look at it. `last_data` is the newest
    /// stored snapshot that carried any metric and drives the staleness rule.
    pub fn evaluate(
        &self,
        site_id: &str,
        snapshot: Option<&Snapshot>,
        last_data: Option<&Snapshot>,
        now: DateTime<Utc>,
    ) -> Vec<Notification> {
        let Some(site) = self.sites.get(site_id) else {
            warn!(site = %site_id, "Evaluation requested for unknown site");
            return Vec::new();
        };

        let states = self.site_states(site_id);
        let mut states = states.lock();
        let mut fired = Vec::new();

        for rule in site.rules.iter().chain(self.staleness.iter()) {
            let condition = rule.condition(&site.name, snapshot, last_data, now);
            let state = states.entry(rule.id.clone()).or_default();
            let transition = step(state, condition.as_breach(), now, rule.cooldown, self.recovery);

            match transition {
                Transition::Fired => {
                    if let Condition::Breached {
                        value,
                        severity,
                        message,
                    } = condition
                    {
                        info!(site = %site_id, rule = %rule.id, %severity, "Alert fired");
                        fired.push(Notification {
                            site_id: site_id.to_string(),
                            rule_id: rule.id.clone(),
                            severity,
                            message,
                            value,
                            threshold: rule.threshold(),
                            fired_at: now,
                        });
                    }
                }
                Transition::Rearmed | Transition::Expired => {
                    debug!(site = %site_id, rule = %rule.id, ?transition, "Alert re-armed");
                }
                Transition::Suppressed | Transition::Unchanged => {}
            }
        }
        fired
    }

    pub fn state(&self, site_id: &str, rule_id: &str) -> Option<AlertState> {
        let states = self.states.read().get(site_id)?.clone();
        let state = states.lock().get(rule_id).cloned();
        state
    }

    /// All states, ordered by key, for checkpointing.
    pub fn export_states(&self) -> Vec<AlertStateEntry> {
        let sites: Vec<(String, Arc<Mutex<BTreeMap<String, AlertState>>>)> = self
            .states
            .read()
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();
        let mut entries: Vec<AlertStateEntry> = sites
            .into_iter()
            .flat_map(|(site_id, states)| {
                states
                    .lock()
                    .iter()
                    .map(|(rule_id, state)| AlertStateEntry {
                        key: AlertKey::new(site_id.clone(), rule_id.clone()),
                        state: state.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Restores checkpointed states. Entries for sites or rules that no
    /// longer exist are dropped. Returns how many were kept.
    pub fn restore_states(&self, entries: Vec<AlertStateEntry>) -> usize {
        let mut restored = 0;
        for AlertStateEntry { key, mut state } in entries {
            let Some(site) = self.sites.get(&key.site_id) else {
                continue;
            };
            let known = site.rules.iter().any(|r| r.id == key.rule_id)
                || self.staleness.as_ref().is_some_and(|r| r.id == key.rule_id);
            if !known {
                continue;
            }
            if state.phase == AlertPhase::Active {
                state.phase = if state.last_fired.is_some() {
                    AlertPhase::Cooldown
                } else {
                    AlertPhase::Idle
                };
            }
            self.site_states(&key.site_id)
                .lock()
                .insert(key.rule_id, state);
            restored += 1;
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::collections::BTreeMap as Map;
    use tracing_test::traced_test;
    use wattvakt_config::{RuleConfig, StalenessConfig};
    use wattvakt_core::model::{Comparator, Unit, STALENESS_METRIC};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    fn site(id: &str) -> SiteConfig {
        SiteConfig {
            id: id.into(),
            name: Some(format!("{id} site")),
            enabled: true,
            sources: Vec::new(),
            rules: vec!["low-soc".into()],
        }
    }

    fn config(recovery: RecoveryMode) -> AlertsConfig {
        AlertsConfig {
            recovery,
            staleness: StalenessConfig::default(),
            rules: vec![RuleConfig {
                id: "low-soc".into(),
                metric: "soc".into(),
                comparator: Comparator::Lt,
                threshold: 20.0,
                critical: None,
                cooldown_secs: 120 * 60,
                severity: Severity::Medium,
                unit: Unit::Percent,
                enabled: true,
            }],
        }
    }

    fn snapshot(site: &str, minute: i64, soc: f64) -> Snapshot {
        let mut s = Snapshot::new(site, t(minute));
        s.insert_metric("soc", soc, "bms").unwrap();
        s
    }

    fn cycle(engine: &AlertEngine, site: &str, minute: i64, soc: f64) -> Vec<Notification> {
        let s = snapshot(site, minute, soc);
        engine.evaluate(site, Some(&s), Some(&s), t(minute))
    }

    #[test]
    fn three_breaching_cycles_notify_once() {
        let engine = AlertEngine::new(&config(RecoveryMode::Immediate), &[site("cabin")]).unwrap();
        let total: usize = [0, 15, 30]
            .iter()
            .map(|&m| cycle(&engine, "cabin", m, 12.0).len())
            .sum();
        assert_eq!(total, 1);
        let state = engine.state("cabin", "low-soc").unwrap();
        assert_eq!(state.phase, AlertPhase::Cooldown);
    }

    #[test]
    fn recovery_rearms_immediately() {
        let engine = AlertEngine::new(&config(RecoveryMode::Immediate), &[site("cabin")]).unwrap();
        assert_eq!(cycle(&engine, "cabin", 0, 12.0).len(), 1);
        assert!(cycle(&engine, "cabin", 15, 60.0).is_empty());
        assert_eq!(
            engine.state("cabin", "low-soc").unwrap().phase,
            AlertPhase::Idle
        );
        assert_eq!(cycle(&engine, "cabin", 30, 12.0).len(), 1);
    }

    #[test]
    fn after_cooldown_recovery_holds_until_elapsed() {
        let engine =
            AlertEngine::new(&config(RecoveryMode::AfterCooldown), &[site("cabin")]).unwrap();
        assert_eq!(cycle(&engine, "cabin", 0, 12.0).len(), 1);
        assert!(cycle(&engine, "cabin", 15, 60.0).is_empty());
        assert_eq!(
            engine.state("cabin", "low-soc").unwrap().phase,
            AlertPhase::Cooldown
        );
        assert!(cycle(&engine, "cabin", 30, 12.0).is_empty());
        assert_eq!(cycle(&engine, "cabin", 120, 12.0).len(), 1);
    }

    #[test]
    fn sites_have_independent_state() {
        let engine = AlertEngine::new(
            &config(RecoveryMode::Immediate),
            &[site("cabin"), site("barn")],
        )
        .unwrap();
        assert_eq!(cycle(&engine, "cabin", 0, 12.0).len(), 1);
        assert_eq!(cycle(&engine, "barn", 0, 12.0).len(), 1);
    }

    #[test]
    fn stale_site_fires_offline_alert_with_normal_values() {
        let engine = AlertEngine::new(&config(RecoveryMode::Immediate), &[site("cabin")]).unwrap();
        let healthy = snapshot("cabin", 0, 90.0);
        assert!(engine
            .evaluate("cabin", Some(&healthy), Some(&healthy), t(0))
            .is_empty());

        let fired = engine.evaluate("cabin", None, Some(&healthy), t(45));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_id, STALENESS_METRIC);
        assert_eq!(fired[0].severity, Severity::High);

        // Longer cooldown keeps it quiet on the next failed cycle.
        assert!(engine.evaluate("cabin", None, Some(&healthy), t(60)).is_empty());
    }

    #[test]
    fn notification_carries_threshold_and_value() {
        let engine = AlertEngine::new(&config(RecoveryMode::Immediate), &[site("cabin")]).unwrap();
        let n = cycle(&engine, "cabin", 0, 12.0).remove(0);
        assert_eq!(n.value, Some(12.0));
        assert_eq!(n.threshold, Some(20.0));
        assert_eq!(n.message, "cabin site: soc is 12% (< 20%)");
        let record = n.to_record(false);
        assert!(!record.delivered);
        assert_eq!(record.fired_at, t(0));
    }

    #[test]
    fn unknown_rule_reference_is_rejected() {
        let mut s = site("cabin");
        s.rules.push("nope".into());
        assert_eq!(
            AlertEngine::new(&config(RecoveryMode::Immediate), &[s]).err(),
            Some(AlertError::UnknownRule("nope".into()))
        );
    }

    #[test]
    fn checkpoint_round_trip_keeps_cooldown() {
        let engine = AlertEngine::new(&config(RecoveryMode::Immediate), &[site("cabin")]).unwrap();
        cycle(&engine, "cabin", 0, 12.0);
        let mut exported = engine.export_states();
        exported.push(AlertStateEntry {
            key: AlertKey::new("gone", "low-soc"),
            state: AlertState::default(),
        });

        let restarted =
            AlertEngine::new(&config(RecoveryMode::Immediate), &[site("cabin")]).unwrap();
        assert_eq!(restarted.restore_states(exported), 2);
        assert!(cycle(&restarted, "cabin", 15, 12.0).is_empty());
        let states: Map<_, _> = restarted
            .export_states()
            .into_iter()
            .map(|e| (e.key.rule_id, e.state.phase))
            .collect();
        assert_eq!(states["low-soc"], AlertPhase::Cooldown);
    }

    #[traced_test]
    #[test]
    fn firing_is_logged() {
        let engine = AlertEngine::new(&config(RecoveryMode::Immediate), &[site("cabin")]).unwrap();
        cycle(&engine, "cabin", 0, 12.0);
        assert!(logs_contain("Alert fired"));
    }
}
