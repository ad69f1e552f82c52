//! Alert Manager Implementation

use chrono::{DateTime, Utc};
use monitor_core::{MetricSnapshot, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AlertError;
use crate::rule::AlertRule;

/// Lifecycle status of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    /// Firing or acknowledged: the rule's episode is still open
    pub fn is_active(self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// A fired alert. Never deleted, only transitioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub rule_id: String,
    pub rule_name: String,
    /// Copied from the rule at fire time
    pub severity: Severity,
    pub message: String,
    pub fired_at: DateTime<Utc>,
    pub status: AlertStatus,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Full metric snapshot at fire time
    pub context: MetricSnapshot,
    pub incident_ids: Vec<Uuid>,
    /// Routing copied from the rule at fire time
    pub channels: Vec<String>,
    pub runbook: Option<String>,
}

impl Alert {
    fn fire(rule: &AlertRule, value: f64, snapshot: &MetricSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            message: rule.message(value),
            fired_at: now,
            status: AlertStatus::Firing,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            context: snapshot.clone(),
            incident_ids: Vec::new(),
            channels: rule.channels.clone(),
            runbook: rule.runbook.clone(),
        }
    }
}

/// In-memory alert store with per-rule deduplication
#[derive(Debug, Default)]
pub struct AlertManager {
    /// All alerts in fire order
    alerts: Vec<Alert>,
    /// Alert id to position in `alerts`
    index: HashMap<Uuid, usize>,
    /// Rule id to its active (firing or acknowledged) alert
    active: HashMap<String, Uuid>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire a new alert for `rule` unless one is already active.
    ///
    /// Returns `None` when suppressed by deduplication.
    pub fn fire(
        &mut self,
        rule: &AlertRule,
        value: f64,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        if let Some(existing) = self.active.get(&rule.id) {
            debug!(rule_id = %rule.id, alert_id = %existing, "Alert suppressed: already active");
            return None;
        }

        let alert = Alert::fire(rule, value, snapshot, now);
        info!(
            rule_id = %rule.id,
            alert_id = %alert.id,
            severity = %alert.severity,
            "Alert fired: {}",
            alert.message
        );

        self.active.insert(rule.id.clone(), alert.id);
        self.index.insert(alert.id, self.alerts.len());
        self.alerts.push(alert.clone());
        Some(alert)
    }

    /// Acknowledge a firing alert
    pub fn acknowledge(
        &mut self,
        id: Uuid,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<Alert, AlertError> {
        let alert = self.get_mut(id)?;

        if alert.status != AlertStatus::Firing {
            return Err(AlertError::InvalidState {
                id,
                status: alert.status,
                operation: "acknowledge",
            });
        }

        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_by = Some(user.to_string());
        alert.acknowledged_at = Some(now);
        info!(alert_id = %id, user, "Alert acknowledged");

        Ok(alert.clone())
    }

    /// Resolve an alert.
    ///
    /// Returns `Ok(None)` when the alert was already resolved.
    pub fn resolve(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Alert>, AlertError> {
        let alert = self.get_mut(id)?;

        if alert.status == AlertStatus::Resolved {
            debug!(alert_id = %id, "Alert already resolved");
            return Ok(None);
        }

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(now);
        let resolved = alert.clone();
        self.active.remove(&resolved.rule_id);
        info!(alert_id = %id, rule_id = %resolved.rule_id, "Alert resolved");

        Ok(Some(resolved))
    }

    /// Resolve the active alert of a rule, if any
    pub fn resolve_active(&mut self, rule_id: &str, now: DateTime<Utc>) -> Option<Alert> {
        let id = *self.active.get(rule_id)?;
        self.resolve(id, now).ok().flatten()
    }

    /// Record an incident spawned from an alert
    pub fn link_incident(&mut self, id: Uuid, incident_id: Uuid) -> Result<(), AlertError> {
        let alert = self.get_mut(id)?;
        if !alert.incident_ids.contains(&incident_id) {
            alert.incident_ids.push(incident_id);
        }
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<&Alert> {
        self.index.get(&id).map(|&i| &self.alerts[i])
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut Alert, AlertError> {
        let i = *self.index.get(&id).ok_or(AlertError::NotFound(id))?;
        Ok(&mut self.alerts[i])
    }

    /// Active alert for a rule
    pub fn active_for_rule(&self, rule_id: &str) -> Option<&Alert> {
        self.active.get(rule_id).and_then(|id| self.get(*id))
    }

    /// All firing or acknowledged alerts
    pub fn active(&self) -> Vec<&Alert> {
        self.alerts.iter().filter(|a| a.status.is_active()).collect()
    }

    /// Every alert a rule has fired, oldest first
    pub fn for_rule<'a>(&'a self, rule_id: &'a str) -> impl Iterator<Item = &'a Alert> + 'a {
        self.alerts.iter().filter(move |a| a.rule_id == rule_id)
    }

    /// Full audit history, oldest first
    pub fn all(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
