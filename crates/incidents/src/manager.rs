//! Incident Manager Implementation

use alerting::Alert;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::IncidentError;
use crate::incident::{
    Incident, IncidentSeverity, IncidentStatus, IncidentUpdate, TimelineKind,
};
use crate::oncall::{OnCallDirectory, RotationSchedule};

/// Resolution reason recorded when the triggering alert recovers
pub const ALERT_RESOLVED_REASON: &str = "alert condition resolved";

/// In-memory incident store
pub struct IncidentManager {
    incidents: Vec<Incident>,
    index: HashMap<Uuid, usize>,
    on_call: Arc<dyn OnCallDirectory>,
}

impl IncidentManager {
    pub fn new(on_call: Arc<dyn OnCallDirectory>) -> Self {
        Self {
            incidents: Vec::new(),
            index: HashMap::new(),
            on_call,
        }
    }

    /// Open an incident for a critical or high alert.
    ///
    /// Returns `None` for alerts whose severity does not open incidents.
    pub fn create_from_alert(&mut self, alert: &Alert, now: DateTime<Utc>) -> Option<Incident> {
        if !alert.severity.opens_incident() {
            return None;
        }
        let severity = IncidentSeverity::from_alert(alert.severity)?;

        let mut incident = Incident::open(
            alert.rule_name.clone(),
            alert.message.clone(),
            severity,
            now,
        );
        incident.alert_ids.push(alert.id);
        incident.channels = alert.channels.clone();
        incident.record(
            now,
            TimelineKind::Created,
            format!("Incident created from alert {}", alert.id),
            None,
        );
        self.assign_on_call(&mut incident, now);

        Some(self.insert(incident))
    }

    /// Declare an incident without a triggering alert
    pub fn declare(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        severity: IncidentSeverity,
        user: &str,
        now: DateTime<Utc>,
    ) -> Incident {
        let mut incident = Incident::open(title.into(), description.into(), severity, now);
        incident.record(now, TimelineKind::Created, "Incident declared", Some(user));
        self.assign_on_call(&mut incident, now);
        self.insert(incident)
    }

    fn assign_on_call(&self, incident: &mut Incident, now: DateTime<Utc>) {
        match self.on_call.current_on_call(now) {
            Some(engineer) => {
                incident.record(
                    now,
                    TimelineKind::Assigned,
                    format!("Assigned to on-call engineer {engineer}"),
                    None,
                );
                incident.assigned_to = Some(engineer);
            }
            None => warn!(title = %incident.title, "No on-call engineer, incident left unassigned"),
        }
    }

    fn insert(&mut self, incident: Incident) -> Incident {
        info!(
            incident_id = %incident.id,
            severity = %incident.severity,
            assignee = incident.assigned_to.as_deref().unwrap_or("-"),
            "Incident opened: {}",
            incident.title
        );
        self.index.insert(incident.id, self.incidents.len());
        self.incidents.push(incident.clone());
        incident
    }

    /// Apply operator changes. All fields are validated before any is applied.
    pub fn update(
        &mut self,
        id: Uuid,
        update: IncidentUpdate,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<Incident, IncidentError> {
        let incident = self.get_mut(id)?;

        if let Some(status) = update.status {
            if incident.is_resolved() && status != IncidentStatus::Resolved {
                return Err(IncidentError::InvalidState {
                    id,
                    status: incident.status,
                    operation: "reopen",
                });
            }
        }

        if let Some(impact) = update.impact {
            incident.impact = Some(impact);
        }
        if let Some(root_cause) = update.root_cause {
            incident.root_cause = Some(root_cause);
        }
        if let Some(resolution) = update.resolution {
            incident.resolution = Some(resolution);
        }

        if let Some(assignee) = update.assigned_to {
            if incident.assigned_to.as_deref() != Some(assignee.as_str()) {
                incident.record(
                    now,
                    TimelineKind::Assigned,
                    format!("Reassigned to {assignee}"),
                    Some(user),
                );
                incident.assigned_to = Some(assignee);
            }
        }

        if let Some(status) = update.status {
            if status != incident.status {
                if status == IncidentStatus::Resolved {
                    let text = incident
                        .resolution
                        .clone()
                        .unwrap_or_else(|| format!("Resolved by {user}"));
                    Self::close(incident, text, Some(user), now);
                } else {
                    let message = format!("Status changed from {} to {}", incident.status, status);
                    incident.record(now, TimelineKind::StatusChanged, message, Some(user));
                    if incident.acknowledged_at.is_none() {
                        incident.acknowledged_at = Some(now);
                    }
                    incident.status = status;
                }
            }
        }

        debug!(incident_id = %id, user, "Incident updated");
        Ok(incident.clone())
    }

    /// Resolve an incident.
    ///
    /// Returns `Ok(None)` when it was already resolved.
    pub fn resolve(
        &mut self,
        id: Uuid,
        resolution: &str,
        user: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>, IncidentError> {
        let incident = self.get_mut(id)?;

        if incident.is_resolved() {
            debug!(incident_id = %id, "Incident already resolved");
            return Ok(None);
        }

        Self::close(incident, resolution.to_string(), user, now);
        Ok(Some(incident.clone()))
    }

    fn close(incident: &mut Incident, resolution: String, user: Option<&str>, now: DateTime<Utc>) {
        incident.record(
            now,
            TimelineKind::Resolved,
            format!("Incident resolved: {resolution}"),
            user,
        );
        incident.status = IncidentStatus::Resolved;
        incident.resolved_at = Some(now);
        incident.resolution = Some(resolution);
        info!(incident_id = %incident.id, "Incident resolved");
    }

    /// Move an open incident to investigating because its alert was acknowledged.
    ///
    /// Returns `Ok(None)` when the incident had already left `open`.
    pub fn acknowledge_from_alert(
        &mut self,
        id: Uuid,
        alert_id: Uuid,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>, IncidentError> {
        let incident = self.get_mut(id)?;

        if incident.status != IncidentStatus::Open {
            return Ok(None);
        }

        incident.record(
            now,
            TimelineKind::Acknowledged,
            format!("Alert {alert_id} acknowledged"),
            Some(user),
        );
        incident.status = IncidentStatus::Investigating;
        incident.acknowledged_at.get_or_insert(now);
        info!(incident_id = %id, user, "Incident acknowledged");

        Ok(Some(incident.clone()))
    }

    /// Append a free-form note. Allowed on resolved incidents.
    pub fn add_note(
        &mut self,
        id: Uuid,
        message: &str,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<Incident, IncidentError> {
        let incident = self.get_mut(id)?;
        incident.record(now, TimelineKind::Note, message, Some(user));
        Ok(incident.clone())
    }

    /// Escalate incidents still open and unacknowledged after `after`.
    ///
    /// Each incident escalates at most once.
    pub fn escalate_overdue(&mut self, after: Duration, now: DateTime<Utc>) -> Vec<Incident> {
        let mut escalated = Vec::new();

        for incident in self.incidents.iter_mut() {
            let overdue = incident.status == IncidentStatus::Open
                && incident.acknowledged_at.is_none()
                && incident.escalated_at.is_none()
                && now - incident.created_at >= after;
            if !overdue {
                continue;
            }

            let waited = (now - incident.created_at).num_minutes();
            incident.record(
                now,
                TimelineKind::Escalated,
                format!("Escalated: unacknowledged for {waited} minutes"),
                None,
            );
            incident.escalated_at = Some(now);
            warn!(incident_id = %incident.id, waited_minutes = waited, "Incident escalated");
            escalated.push(incident.clone());
        }

        escalated
    }

    pub fn get(&self, id: Uuid) -> Option<&Incident> {
        self.index.get(&id).map(|&i| &self.incidents[i])
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut Incident, IncidentError> {
        let i = *self.index.get(&id).ok_or(IncidentError::NotFound(id))?;
        Ok(&mut self.incidents[i])
    }

    /// Incidents in a given status, oldest first
    pub fn by_status(&self, status: IncidentStatus) -> Vec<&Incident> {
        self.incidents.iter().filter(|i| i.status == status).collect()
    }

    /// Incidents not yet resolved
    pub fn unresolved(&self) -> Vec<&Incident> {
        self.incidents.iter().filter(|i| !i.is_resolved()).collect()
    }

    pub fn all(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }
}

impl Default for IncidentManager {
    fn default() -> Self {
        Self::new(Arc::new(RotationSchedule::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oncall::Shift;
    use alerting::{AlertManager, AlertRule, CompareOp, Condition};
    use chrono::TimeZone;
    use monitor_core::{MetricSnapshot, Severity};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn fire(severity: Severity) -> Alert {
        let rule = AlertRule::new(
            "cpu-high",
            "High CPU",
            severity,
            Condition::new("cpu", CompareOp::GreaterThan, 80.0),
        )
        .with_channels(["ops"]);
        let snapshot = MetricSnapshot::new(t0()).with("cpu", 85.0);
        AlertManager::new().fire(&rule, 85.0, &snapshot, t0()).unwrap()
    }

    fn on_call_alice() -> Arc<dyn OnCallDirectory> {
        Arc::new(RotationSchedule::new(vec![Shift {
            engineer: "alice".into(),
            start: t0() - Duration::hours(1),
            end: t0() + Duration::hours(8),
        }]))
    }

    #[test]
    fn test_create_from_high_alert() {
        let mut manager = IncidentManager::new(on_call_alice());
        let alert = fire(Severity::High);

        let incident = manager.create_from_alert(&alert, t0()).unwrap();
        assert_eq!(incident.severity, IncidentSeverity::Sev2);
        assert_eq!(incident.status, IncidentStatus::Open);
        assert_eq!(incident.alert_ids, vec![alert.id]);
        assert_eq!(incident.assigned_to.as_deref(), Some("alice"));
        assert_eq!(incident.timeline[0].kind, TimelineKind::Created);
        assert_eq!(incident.channels, vec!["ops".to_string()]);
    }

    #[test]
    fn test_critical_maps_to_sev1() {
        let mut manager = IncidentManager::default();
        let incident = manager.create_from_alert(&fire(Severity::Critical), t0()).unwrap();
        assert_eq!(incident.severity, IncidentSeverity::Sev1);
        assert!(incident.assigned_to.is_none());
    }

    #[test]
    fn test_lower_severities_never_open_incidents() {
        let mut manager = IncidentManager::default();
        for severity in [Severity::Medium, Severity::Low, Severity::Info] {
            assert!(manager.create_from_alert(&fire(severity), t0()).is_none());
        }
        assert!(manager.is_empty());
    }

    #[test]
    fn test_update_status_and_fields() {
        let mut manager = IncidentManager::default();
        let incident = manager.create_from_alert(&fire(Severity::High), t0()).unwrap();
        let later = t0() + Duration::minutes(4);

        let update = IncidentUpdate {
            status: Some(IncidentStatus::Identified),
            root_cause: Some("connection pool exhausted".into()),
            assigned_to: Some("bob".into()),
            ..Default::default()
        };
        let updated = manager.update(incident.id, update, "bob", later).unwrap();

        assert_eq!(updated.status, IncidentStatus::Identified);
        assert_eq!(updated.root_cause.as_deref(), Some("connection pool exhausted"));
        assert_eq!(updated.assigned_to.as_deref(), Some("bob"));
        assert_eq!(updated.acknowledged_at, Some(later));
        let kinds: Vec<_> = updated.timeline.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![TimelineKind::Created, TimelineKind::Assigned, TimelineKind::StatusChanged]
        );
    }

    #[test]
    fn test_update_without_changes_adds_no_timeline() {
        let mut manager = IncidentManager::default();
        let incident = manager.create_from_alert(&fire(Severity::High), t0()).unwrap();

        let updated = manager
            .update(incident.id, IncidentUpdate::status(IncidentStatus::Open), "bob", t0())
            .unwrap();
        assert_eq!(updated.timeline.len(), incident.timeline.len());
    }

    #[test]
    fn test_update_cannot_reopen_and_is_atomic() {
        let mut manager = IncidentManager::default();
        let incident = manager.create_from_alert(&fire(Severity::High), t0()).unwrap();
        manager.resolve(incident.id, "fixed", Some("bob"), t0()).unwrap();

        let update = IncidentUpdate {
            status: Some(IncidentStatus::Investigating),
            impact: Some("should not apply".into()),
            ..Default::default()
        };
        let err = manager.update(incident.id, update, "bob", t0()).unwrap_err();
        assert!(matches!(err, IncidentError::InvalidState { .. }));
        assert!(manager.get(incident.id).unwrap().impact.is_none());
    }

    #[test]
    fn test_update_to_resolved_closes_incident() {
        let mut manager = IncidentManager::default();
        let incident = manager.create_from_alert(&fire(Severity::High), t0()).unwrap();

        let update = IncidentUpdate {
            status: Some(IncidentStatus::Resolved),
            resolution: Some("rolled back".into()),
            ..Default::default()
        };
        let resolved = manager.update(incident.id, update, "bob", t0()).unwrap();
        assert_eq!(resolved.resolved_at, Some(t0()));
        assert_eq!(resolved.resolution.as_deref(), Some("rolled back"));
    }

    #[test]
    fn test_resolve_idempotent() {
        let mut manager = IncidentManager::default();
        let incident = manager.create_from_alert(&fire(Severity::High), t0()).unwrap();

        let first = manager
            .resolve(incident.id, ALERT_RESOLVED_REASON, None, t0() + Duration::minutes(10))
            .unwrap()
            .unwrap();
        assert_eq!(first.status, IncidentStatus::Resolved);
        assert_eq!(first.resolution.as_deref(), Some(ALERT_RESOLVED_REASON));
        assert_eq!(first.timeline.last().unwrap().kind, TimelineKind::Resolved);

        let second = manager.resolve(incident.id, "again", None, t0() + Duration::hours(1));
        assert_eq!(second.unwrap().map(|i| i.id), None);
        assert_eq!(
            manager.get(incident.id).unwrap().resolved_at,
            Some(t0() + Duration::minutes(10))
        );
    }

    #[test]
    fn test_resolve_unknown() {
        let mut manager = IncidentManager::default();
        let id = Uuid::new_v4();
        assert_eq!(
            manager.resolve(id, "x", None, t0()).unwrap_err(),
            IncidentError::NotFound(id)
        );
    }

    #[test]
    fn test_acknowledge_from_alert_only_from_open() {
        let mut manager = IncidentManager::default();
        let alert = fire(Severity::High);
        let incident = manager.create_from_alert(&alert, t0()).unwrap();

        let acked = manager
            .acknowledge_from_alert(incident.id, alert.id, "alice", t0() + Duration::minutes(2))
            .unwrap()
            .unwrap();
        assert_eq!(acked.status, IncidentStatus::Investigating);
        assert_eq!(acked.time_to_acknowledge(), Some(Duration::minutes(2)));

        let again = manager
            .acknowledge_from_alert(incident.id, alert.id, "alice", t0() + Duration::minutes(3))
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_escalation_once() {
        let mut manager = IncidentManager::default();
        let incident = manager.create_from_alert(&fire(Severity::Critical), t0()).unwrap();
        let after = Duration::minutes(15);

        assert!(manager.escalate_overdue(after, t0() + Duration::minutes(10)).is_empty());
        let escalated = manager.escalate_overdue(after, t0() + Duration::minutes(15));
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].id, incident.id);
        assert!(manager.escalate_overdue(after, t0() + Duration::minutes(30)).is_empty());
    }

    #[test]
    fn test_acknowledged_incident_not_escalated() {
        let mut manager = IncidentManager::default();
        let alert = fire(Severity::Critical);
        let incident = manager.create_from_alert(&alert, t0()).unwrap();
        manager
            .acknowledge_from_alert(incident.id, alert.id, "alice", t0() + Duration::minutes(1))
            .unwrap();

        assert!(manager.escalate_overdue(Duration::minutes(15), t0() + Duration::hours(1)).is_empty());
    }

    #[test]
    fn test_declare_and_note() {
        let mut manager = IncidentManager::new(on_call_alice());
        let incident = manager.declare(
            "Checkout errors",
            "Customers report failed payments",
            IncidentSeverity::Sev3,
            "carol",
            t0(),
        );
        assert!(incident.alert_ids.is_empty());
        assert_eq!(incident.assigned_to.as_deref(), Some("alice"));

        manager.resolve(incident.id, "provider recovered", Some("carol"), t0()).unwrap();
        let noted = manager
            .add_note(incident.id, "postmortem scheduled", "carol", t0())
            .unwrap();
        let last = noted.timeline.last().unwrap();
        assert_eq!(last.kind, TimelineKind::Note);
        assert_eq!(last.user.as_deref(), Some("carol"));
    }
}
