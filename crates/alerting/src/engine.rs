//! Rule Evaluation Engine

use chrono::{DateTime, Utc};
use monitor_core::MetricSnapshot;
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

use crate::manager::{Alert, AlertManager};
use crate::rule::AlertRule;

/// Outcome of evaluating one rule on one tick
#[derive(Debug, Clone)]
pub enum AlertTransition {
    /// A new alert started firing
    Fired(Alert),
    /// The condition cleared and the active alert was auto-resolved
    Resolved(Alert),
}

impl AlertTransition {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertTransition::Fired(alert) | AlertTransition::Resolved(alert) => alert,
        }
    }
}

/// Evaluates the configured rules against metric snapshots
pub struct RuleEngine {
    rules: Vec<AlertRule>,
    /// Rule id to the first tick its condition held, for rules with a sustained duration
    pending: HashMap<String, DateTime<Utc>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        info!(
            "Rule engine created with {} rules ({} enabled)",
            rules.len(),
            rules.iter().filter(|r| r.enabled).count()
        );
        Self {
            rules,
            pending: HashMap::new(),
        }
    }

    /// Evaluate every enabled rule against `snapshot`.
    ///
    /// Rules whose metric is absent from the snapshot, or reads NaN or
    /// infinity, are skipped and keep their current state.
    pub fn evaluate(
        &mut self,
        snapshot: &MetricSnapshot,
        alerts: &mut AlertManager,
        now: DateTime<Utc>,
    ) -> Vec<AlertTransition> {
        let mut transitions = Vec::new();

        for rule in self.rules.iter().filter(|r| r.enabled) {
            let Some(value) = snapshot.get(&rule.condition.metric) else {
                trace!(rule_id = %rule.id, metric = %rule.condition.metric, "Metric absent, rule skipped");
                continue;
            };
            if !value.is_finite() {
                warn!(rule_id = %rule.id, metric = %rule.condition.metric, value, "Non-finite metric value, rule skipped");
                continue;
            }

            if rule.condition.holds(value) {
                if alerts.active_for_rule(&rule.id).is_some() {
                    continue;
                }

                if rule.duration_secs > 0 {
                    let since = *self.pending.entry(rule.id.clone()).or_insert(now);
                    let held = (now - since).to_std().unwrap_or_default();
                    if held < rule.duration() {
                        debug!(
                            rule_id = %rule.id,
                            held_secs = held.as_secs(),
                            required_secs = rule.duration_secs,
                            "Condition pending"
                        );
                        continue;
                    }
                }

                self.pending.remove(&rule.id);
                if let Some(alert) = alerts.fire(rule, value, snapshot, now) {
                    transitions.push(AlertTransition::Fired(alert));
                }
            } else {
                self.pending.remove(&rule.id);
                if let Some(alert) = alerts.resolve_active(&rule.id, now) {
                    transitions.push(AlertTransition::Resolved(alert));
                }
            }
        }

        transitions
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&AlertRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::AlertStatus;
    use crate::rule::{CompareOp, Condition};
    use chrono::{Duration, TimeZone};
    use monitor_core::Severity;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn cpu_rule() -> AlertRule {
        AlertRule::new(
            "cpu-high",
            "High CPU",
            Severity::High,
            Condition::new("cpu", CompareOp::GreaterThan, 80.0),
        )
    }

    fn snapshot(cpu: f64) -> MetricSnapshot {
        MetricSnapshot::new(t0()).with("cpu", cpu)
    }

    #[test]
    fn test_fire_and_auto_resolve() {
        let mut engine = RuleEngine::new(vec![cpu_rule()]);
        let mut alerts = AlertManager::new();

        let fired = engine.evaluate(&snapshot(85.0), &mut alerts, t0());
        assert_eq!(fired.len(), 1);
        let AlertTransition::Fired(alert) = &fired[0] else {
            panic!("expected fire");
        };
        assert!(alert.message.contains("85.00"));
        assert_eq!(alert.context.get("cpu"), Some(85.0));

        let resolved = engine.evaluate(&snapshot(70.0), &mut alerts, t0() + Duration::seconds(30));
        assert_eq!(resolved.len(), 1);
        assert!(matches!(resolved[0], AlertTransition::Resolved(_)));
        assert_eq!(alerts.get(alert.id).unwrap().status, AlertStatus::Resolved);
    }

    #[test]
    fn test_missing_metric_skips_rule() {
        let mut engine = RuleEngine::new(vec![cpu_rule()]);
        let mut alerts = AlertManager::new();

        engine.evaluate(&snapshot(85.0), &mut alerts, t0());
        let empty = MetricSnapshot::new(t0()).with("memory", 10.0);
        let transitions = engine.evaluate(&empty, &mut alerts, t0() + Duration::seconds(30));

        assert!(transitions.is_empty());
        assert_eq!(alerts.active().len(), 1);
    }

    #[test]
    fn test_non_finite_value_skips_rule() {
        let mut engine = RuleEngine::new(vec![cpu_rule()]);
        let mut alerts = AlertManager::new();
        engine.evaluate(&snapshot(85.0), &mut alerts, t0());

        for bogus in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(engine.evaluate(&snapshot(bogus), &mut alerts, t0()).is_empty());
        }
        assert_eq!(alerts.active().len(), 1);

        let not_equal = AlertRule::new(
            "queue-stuck",
            "Queue stuck",
            Severity::Medium,
            Condition::new("queue", CompareOp::NotEqual, 0.0),
        );
        let mut engine = RuleEngine::new(vec![not_equal]);
        let mut alerts = AlertManager::new();
        let nan = MetricSnapshot::new(t0()).with("queue", f64::NAN);
        assert!(engine.evaluate(&nan, &mut alerts, t0()).is_empty());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_disabled_rule_never_fires() {
        let mut engine = RuleEngine::new(vec![cpu_rule().disabled()]);
        let mut alerts = AlertManager::new();

        assert!(engine.evaluate(&snapshot(99.0), &mut alerts, t0()).is_empty());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_sustained_duration() {
        let rule = cpu_rule().with_duration(std::time::Duration::from_secs(60));
        let mut engine = RuleEngine::new(vec![rule]);
        let mut alerts = AlertManager::new();

        assert!(engine.evaluate(&snapshot(90.0), &mut alerts, t0()).is_empty());
        assert!(engine
            .evaluate(&snapshot(90.0), &mut alerts, t0() + Duration::seconds(30))
            .is_empty());
        let fired = engine.evaluate(&snapshot(90.0), &mut alerts, t0() + Duration::seconds(60));
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_sustained_duration_resets_when_condition_clears() {
        let rule = cpu_rule().with_duration(std::time::Duration::from_secs(60));
        let mut engine = RuleEngine::new(vec![rule]);
        let mut alerts = AlertManager::new();

        engine.evaluate(&snapshot(90.0), &mut alerts, t0());
        engine.evaluate(&snapshot(50.0), &mut alerts, t0() + Duration::seconds(30));
        let transitions =
            engine.evaluate(&snapshot(90.0), &mut alerts, t0() + Duration::seconds(70));

        assert!(transitions.is_empty());
        assert!(alerts.is_empty());
    }

    proptest! {
        #[test]
        fn prop_false_condition_never_fires(values in prop::collection::vec(-1000.0f64..=80.0, 1..20)) {
            let mut engine = RuleEngine::new(vec![cpu_rule()]);
            let mut alerts = AlertManager::new();

            for (i, cpu) in values.iter().enumerate() {
                let now = t0() + Duration::seconds(i as i64 * 30);
                engine.evaluate(&snapshot(*cpu), &mut alerts, now);
            }

            prop_assert!(alerts.is_empty());
        }

        #[test]
        fn prop_sustained_breach_fires_once(values in prop::collection::vec(80.01f64..1000.0, 1..20)) {
            let mut engine = RuleEngine::new(vec![cpu_rule()]);
            let mut alerts = AlertManager::new();

            for (i, cpu) in values.iter().enumerate() {
                let now = t0() + Duration::seconds(i as i64 * 30);
                engine.evaluate(&snapshot(*cpu), &mut alerts, now);
            }

            prop_assert_eq!(alerts.len(), 1);
            prop_assert_eq!(alerts.active().len(), 1);
        }
    }
}
