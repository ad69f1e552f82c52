//! Monitoring Engine
//!
//! Owns alert, incident, and SLO state together with the collaborators that
//! feed it. All alert and incident mutations go through one async lock so a
//! tick's auto-resolve can never interleave with an operator acknowledge.

use alerting::{Alert, AlertManager, AlertStatus, AlertTransition, RuleEngine};
use chrono::{DateTime, Utc};
use incidents::{
    Incident, IncidentManager, IncidentSeverity, IncidentStatus, IncidentUpdate, OnCallDirectory,
    ALERT_RESOLVED_REASON,
};
use monitor_core::Clock;
use notify::{Notification, NotificationKind, NotificationQueue};
use reporting::{MonitoringReport, ReportBuilder};
use slo::{SloSource, SloState, SloTracker, SloTransition};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::source::MetricSource;

/// External collaborators injected into the engine
pub struct EngineDeps {
    pub metrics: Arc<dyn MetricSource>,
    pub slo_source: Arc<dyn SloSource>,
    pub notifications: NotificationQueue,
    pub on_call: Arc<dyn OnCallDirectory>,
    pub clock: Arc<dyn Clock>,
}

/// What one rule-evaluation tick changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub alerts_fired: usize,
    pub alerts_resolved: usize,
    pub incidents_opened: usize,
    pub incidents_resolved: usize,
    pub incidents_escalated: usize,
}

/// Result of asking the engine to tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another evaluation was still running
    Skipped,
}

struct EngineState {
    rules: RuleEngine,
    alerts: AlertManager,
    incidents: IncidentManager,
}

/// The alerting, incident, and SLO engine
pub struct MonitoringEngine {
    state: Mutex<EngineState>,
    slos: Mutex<SloTracker>,
    /// Held for the duration of a tick; a second tick that cannot take it is skipped
    evaluation: Mutex<()>,
    metrics: Arc<dyn MetricSource>,
    slo_source: Arc<dyn SloSource>,
    notifications: NotificationQueue,
    clock: Arc<dyn Clock>,
    escalation_after: Option<chrono::Duration>,
    default_channels: Vec<String>,
    reports: ReportBuilder,
}

impl MonitoringEngine {
    pub fn new(config: &MonitorConfig, deps: EngineDeps) -> Self {
        info!(
            rules = config.rules.len(),
            slos = config.slos.len(),
            "Creating monitoring engine"
        );
        Self {
            state: Mutex::new(EngineState {
                rules: RuleEngine::new(config.rules.clone()),
                alerts: AlertManager::new(),
                incidents: IncidentManager::new(deps.on_call),
            }),
            slos: Mutex::new(SloTracker::new(config.slos.clone())),
            evaluation: Mutex::new(()),
            metrics: deps.metrics,
            slo_source: deps.slo_source,
            notifications: deps.notifications,
            clock: deps.clock,
            escalation_after: config.escalation_after(),
            default_channels: config.default_channels.clone(),
            reports: ReportBuilder::new(config.report_top_n),
        }
    }

    /// Pull a snapshot and evaluate every rule once.
    ///
    /// Returns `Skipped` if another tick is still in progress. A failing
    /// metric source leaves all alert state untouched.
    pub async fn tick(&self) -> Result<TickOutcome, MonitorError> {
        let Ok(_guard) = self.evaluation.try_lock() else {
            warn!("Evaluation still in progress, tick skipped");
            metrics::counter!("scheduler_ticks_skipped_total").increment(1);
            return Ok(TickOutcome::Skipped);
        };

        let snapshot = self.metrics.snapshot().await?;
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let mut report = TickReport::default();

        let EngineState {
            rules,
            alerts,
            incidents,
        } = &mut *state;
        let transitions = rules.evaluate(&snapshot, alerts, now);

        for transition in transitions {
            match transition {
                AlertTransition::Fired(alert) => {
                    report.alerts_fired += 1;
                    metrics::counter!("alerts_fired_total", "severity" => alert.severity.as_str())
                        .increment(1);
                    self.notify_alert(NotificationKind::AlertFired, &alert, now);

                    if let Some(incident) = incidents.create_from_alert(&alert, now) {
                        alerts.link_incident(alert.id, incident.id)?;
                        report.incidents_opened += 1;
                        metrics::counter!("incidents_created_total").increment(1);
                        self.notify_incident(NotificationKind::IncidentOpened, &incident, now);
                    }
                }
                AlertTransition::Resolved(alert) => {
                    report.alerts_resolved += 1;
                    metrics::counter!("alerts_resolved_total").increment(1);
                    self.notify_alert(NotificationKind::AlertResolved, &alert, now);
                    report.incidents_resolved += self.cascade_resolve(incidents, &alert, None, now);
                }
            }
        }

        if let Some(after) = self.escalation_after {
            for incident in incidents.escalate_overdue(after, now) {
                report.incidents_escalated += 1;
                self.notify_incident(NotificationKind::IncidentEscalated, &incident, now);
            }
        }

        debug!(?report, "Tick complete");
        Ok(TickOutcome::Completed(report))
    }

    /// Measure every SLO once and notify on transitions into `violated`.
    ///
    /// The SLO source is awaited with no lock held; only applying the
    /// readings takes the tracker lock.
    pub async fn evaluate_slos(&self) -> Vec<SloTransition> {
        let definitions = self.slos.lock().await.definitions();
        let readings = slo::measure_all(&definitions, self.slo_source.as_ref()).await;

        let now = self.clock.now();
        let transitions = {
            let mut tracker = self.slos.lock().await;
            let transitions = tracker.apply(readings, now);
            for state in tracker.states() {
                if let Some(m) = state.last {
                    metrics::gauge!("slo_actual_percent", "slo" => state.definition.id.clone())
                        .set(m.actual);
                }
            }
            transitions
        };

        for transition in transitions.iter().filter(|t| t.is_violation()) {
            let def = &transition.definition;
            let m = transition.measurement;
            warn!(slo_id = %def.id, actual = m.actual, target = def.target, "SLO violated");
            self.notifications.enqueue(
                Notification::new(
                    NotificationKind::SloViolated,
                    monitor_core::Severity::High,
                    format!("SLO violated: {}", def.name),
                    format!(
                        "{}: {:.3}% over {} days (target {}%, error budget {:.3}%)",
                        def.name, m.actual, def.window_days, def.target, m.error_budget
                    ),
                    now,
                )
                .to_channels(self.route(&def.channels)),
            );
        }

        transitions
    }

    /// Acknowledge a firing alert and move its open incidents to investigating
    pub async fn acknowledge(&self, alert_id: Uuid, user: &str) -> Result<Alert, MonitorError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let alert = state.alerts.acknowledge(alert_id, user, now)?;
        for incident_id in &alert.incident_ids {
            if let Err(e) = state
                .incidents
                .acknowledge_from_alert(*incident_id, alert.id, user, now)
            {
                warn!(alert_id = %alert.id, incident_id = %incident_id, error = %e, "Incident acknowledge cascade failed");
            }
        }

        Ok(alert)
    }

    /// Resolve an alert by hand. Resolving a resolved alert is a no-op.
    pub async fn resolve_alert(&self, alert_id: Uuid, user: &str) -> Result<Alert, MonitorError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let EngineState {
            alerts, incidents, ..
        } = &mut *state;

        match alerts.resolve(alert_id, now)? {
            Some(alert) => {
                info!(alert_id = %alert_id, user, "Alert resolved manually");
                metrics::counter!("alerts_resolved_total").increment(1);
                self.notify_alert(NotificationKind::AlertResolved, &alert, now);
                self.cascade_resolve(incidents, &alert, Some(user), now);
                Ok(alert)
            }
            None => alerts
                .get(alert_id)
                .cloned()
                .ok_or(MonitorError::Alert(alerting::AlertError::NotFound(alert_id))),
        }
    }

    /// Resolve still-open incidents linked to a resolved alert
    fn cascade_resolve(
        &self,
        incidents: &mut IncidentManager,
        alert: &Alert,
        user: Option<&str>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut resolved = 0;
        for incident_id in &alert.incident_ids {
            match incidents.resolve(*incident_id, ALERT_RESOLVED_REASON, user, now) {
                Ok(Some(incident)) => {
                    resolved += 1;
                    self.notify_incident(NotificationKind::IncidentResolved, &incident, now);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(alert_id = %alert.id, incident_id = %incident_id, error = %e, "Incident resolve cascade failed")
                }
            }
        }
        resolved
    }

    /// Apply operator changes to an incident
    pub async fn update_incident(
        &self,
        id: Uuid,
        update: IncidentUpdate,
        user: &str,
    ) -> Result<Incident, MonitorError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let was_resolved = state.incidents.get(id).is_some_and(Incident::is_resolved);
        let incident = state.incidents.update(id, update, user, now)?;
        if incident.is_resolved() && !was_resolved {
            self.notify_incident(NotificationKind::IncidentResolved, &incident, now);
        }
        Ok(incident)
    }

    /// Resolve an incident. Resolving a resolved incident is a no-op.
    pub async fn resolve_incident(
        &self,
        id: Uuid,
        resolution: &str,
        user: &str,
    ) -> Result<Incident, MonitorError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        match state.incidents.resolve(id, resolution, Some(user), now)? {
            Some(incident) => {
                self.notify_incident(NotificationKind::IncidentResolved, &incident, now);
                Ok(incident)
            }
            None => state
                .incidents
                .get(id)
                .cloned()
                .ok_or(MonitorError::Incident(incidents::IncidentError::NotFound(id))),
        }
    }

    /// Open an incident by hand, without a triggering alert
    pub async fn declare_incident(
        &self,
        title: &str,
        description: &str,
        severity: IncidentSeverity,
        user: &str,
    ) -> Incident {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let incident = state
            .incidents
            .declare(title, description, severity, user, now);
        metrics::counter!("incidents_created_total").increment(1);
        self.notify_incident(NotificationKind::IncidentOpened, &incident, now);
        incident
    }

    /// Append a note to an incident's timeline
    pub async fn add_incident_note(
        &self,
        id: Uuid,
        message: &str,
        user: &str,
    ) -> Result<Incident, MonitorError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        Ok(state.incidents.add_note(id, message, user, now)?)
    }

    /// Build a report over `[start, end]`
    pub async fn build_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MonitoringReport, MonitorError> {
        let slos = self.slo_states().await;
        let state = self.state.lock().await;
        let report = self.reports.build(
            start,
            end,
            state.alerts.all(),
            state.incidents.all(),
            &slos,
        )?;
        Ok(report)
    }

    pub async fn alert(&self, id: Uuid) -> Option<Alert> {
        self.state.lock().await.alerts.get(id).cloned()
    }

    /// Firing and acknowledged alerts
    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.state
            .lock()
            .await
            .alerts
            .active()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn alerts_for_rule(&self, rule_id: &str) -> Vec<Alert> {
        self.state
            .lock()
            .await
            .alerts
            .for_rule(rule_id)
            .cloned()
            .collect()
    }

    pub async fn alerts_with_status(&self, status: AlertStatus) -> Vec<Alert> {
        self.state
            .lock()
            .await
            .alerts
            .all()
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect()
    }

    pub async fn incident(&self, id: Uuid) -> Option<Incident> {
        self.state.lock().await.incidents.get(id).cloned()
    }

    pub async fn incidents_with_status(&self, status: IncidentStatus) -> Vec<Incident> {
        self.state
            .lock()
            .await
            .incidents
            .by_status(status)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn slo_states(&self) -> Vec<SloState> {
        self.slos.lock().await.states().to_vec()
    }

    fn route(&self, channels: &[String]) -> Vec<String> {
        if channels.is_empty() {
            self.default_channels.clone()
        } else {
            channels.to_vec()
        }
    }

    fn notify_alert(&self, kind: NotificationKind, alert: &Alert, now: DateTime<Utc>) {
        let title = match kind {
            NotificationKind::AlertResolved => format!("Resolved: {}", alert.rule_name),
            _ => format!("Firing: {}", alert.rule_name),
        };
        self.notifications.enqueue(
            Notification::new(kind, alert.severity, title, alert.message.clone(), now)
                .with_runbook(alert.runbook.clone())
                .to_channels(self.route(&alert.channels)),
        );
    }

    fn notify_incident(&self, kind: NotificationKind, incident: &Incident, now: DateTime<Utc>) {
        let message = match kind {
            NotificationKind::IncidentResolved => format!(
                "{} resolved: {}",
                incident.title,
                incident.resolution.as_deref().unwrap_or("no resolution recorded")
            ),
            NotificationKind::IncidentEscalated => format!(
                "{} is still unacknowledged (assignee: {})",
                incident.title,
                incident.assigned_to.as_deref().unwrap_or("unassigned")
            ),
            _ => incident.description.clone(),
        };
        self.notifications.enqueue(
            Notification::new(
                kind,
                incident.severity.alert_severity(),
                format!("[{}] {}", incident.severity, incident.title),
                message,
                now,
            )
            .to_channels(self.route(&incident.channels)),
        );
    }
}
