//! Report Builder Implementation

use alerting::{Alert, AlertStatus};
use chrono::{DateTime, Duration, Utc};
use incidents::{Incident, IncidentSeverity, IncidentStatus};
use monitor_core::Severity;
use serde::Serialize;
use slo::{SloState, SloStatus};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::ReportError;

/// Default number of rules in the firing-frequency ranking
const DEFAULT_TOP_N: usize = 5;

/// Alert counts for the period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Alerts from the period still firing or acknowledged
    pub active: usize,
}

/// Incident counts for the period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentSummary {
    pub total: usize,
    pub by_severity: BTreeMap<IncidentSeverity, usize>,
    pub resolved: usize,
    pub unresolved: usize,
}

/// Current state of one SLO
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SloSnapshot {
    pub id: String,
    pub name: String,
    pub target: f64,
    /// `None` until the SLO has been measured once
    pub actual: Option<f64>,
    pub error_budget: Option<f64>,
    pub status: Option<SloStatus>,
}

/// How often a rule fired in the period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFrequency {
    pub rule_id: String,
    pub rule_name: String,
    pub count: usize,
}

/// Structured period report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub alerts: AlertSummary,
    pub incidents: IncidentSummary,
    /// Mean time to resolution in seconds, 0 when nothing resolved
    pub mttr_secs: f64,
    /// Mean time to acknowledge in seconds, 0 when nothing acknowledged
    pub mtta_secs: f64,
    pub slos: Vec<SloSnapshot>,
    pub top_rules: Vec<RuleFrequency>,
}

/// Builds [`MonitoringReport`]s
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    top_n: usize,
}

impl ReportBuilder {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Build a report over `[start, end]`.
    ///
    /// Alerts are selected by fire time, incidents by creation time. SLOs are
    /// reported at their current state regardless of the window.
    pub fn build(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        alerts: &[Alert],
        incidents: &[Incident],
        slos: &[SloState],
    ) -> Result<MonitoringReport, ReportError> {
        if start > end {
            return Err(ReportError::InvalidRange { start, end });
        }
        let in_range = |at: DateTime<Utc>| start <= at && at <= end;

        let alerts: Vec<&Alert> = alerts.iter().filter(|a| in_range(a.fired_at)).collect();
        let incidents: Vec<&Incident> =
            incidents.iter().filter(|i| in_range(i.created_at)).collect();
        debug!(
            alerts = alerts.len(),
            incidents = incidents.len(),
            "Building report for {} .. {}",
            start,
            end
        );

        let report = MonitoringReport {
            start,
            end,
            alerts: summarize_alerts(&alerts),
            incidents: summarize_incidents(&incidents),
            mttr_secs: mean_secs(incidents.iter().filter_map(|i| i.time_to_resolve())),
            mtta_secs: mean_secs(incidents.iter().filter_map(|i| i.time_to_acknowledge())),
            slos: slos.iter().map(snapshot_slo).collect(),
            top_rules: self.rank_rules(&alerts),
        };
        Ok(report)
    }

    fn rank_rules(&self, alerts: &[&Alert]) -> Vec<RuleFrequency> {
        let mut counts: HashMap<&str, RuleFrequency> = HashMap::new();
        for alert in alerts {
            counts
                .entry(alert.rule_id.as_str())
                .or_insert_with(|| RuleFrequency {
                    rule_id: alert.rule_id.clone(),
                    rule_name: alert.rule_name.clone(),
                    count: 0,
                })
                .count += 1;
        }

        let mut ranked: Vec<RuleFrequency> = counts.into_values().collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.rule_id.cmp(&b.rule_id)));
        ranked.truncate(self.top_n);
        ranked
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

fn summarize_alerts(alerts: &[&Alert]) -> AlertSummary {
    let mut by_severity: BTreeMap<Severity, usize> =
        Severity::ALL.iter().map(|s| (*s, 0)).collect();
    for alert in alerts {
        *by_severity.entry(alert.severity).or_default() += 1;
    }

    AlertSummary {
        total: alerts.len(),
        by_severity,
        active: alerts.iter().filter(|a| a.status != AlertStatus::Resolved).count(),
    }
}

fn summarize_incidents(incidents: &[&Incident]) -> IncidentSummary {
    let mut by_severity: BTreeMap<IncidentSeverity, usize> = [
        IncidentSeverity::Sev1,
        IncidentSeverity::Sev2,
        IncidentSeverity::Sev3,
        IncidentSeverity::Sev4,
    ]
    .into_iter()
    .map(|s| (s, 0))
    .collect();
    for incident in incidents {
        *by_severity.entry(incident.severity).or_default() += 1;
    }

    let resolved = incidents
        .iter()
        .filter(|i| i.status == IncidentStatus::Resolved)
        .count();

    IncidentSummary {
        total: incidents.len(),
        by_severity,
        resolved,
        unresolved: incidents.len() - resolved,
    }
}

fn snapshot_slo(state: &SloState) -> SloSnapshot {
    SloSnapshot {
        id: state.definition.id.clone(),
        name: state.definition.name.clone(),
        target: state.definition.target,
        actual: state.last.map(|m| m.actual),
        error_budget: state.last.map(|m| m.error_budget),
        status: state.last.map(|m| m.status),
    }
}

fn mean_secs(durations: impl Iterator<Item = Duration>) -> f64 {
    let (sum_ms, count) = durations.fold((0i64, 0u32), |(sum, n), d| {
        (sum + d.num_milliseconds(), n + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum_ms as f64 / 1000.0 / f64::from(count)
    }
}
