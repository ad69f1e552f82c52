//! Incident Types

use chrono::{DateTime, Utc};
use monitor_core::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Incident severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    /// Critical
    Sev1,
    /// High
    Sev2,
    /// Medium
    Sev3,
    /// Low
    Sev4,
}

impl IncidentSeverity {
    /// Map an alert severity. Info alerts have no incident severity.
    pub fn from_alert(severity: Severity) -> Option<Self> {
        match severity {
            Severity::Critical => Some(IncidentSeverity::Sev1),
            Severity::High => Some(IncidentSeverity::Sev2),
            Severity::Medium => Some(IncidentSeverity::Sev3),
            Severity::Low => Some(IncidentSeverity::Sev4),
            Severity::Info => None,
        }
    }

    /// Alert severity used when notifying about this incident
    pub fn alert_severity(self) -> Severity {
        match self {
            IncidentSeverity::Sev1 => Severity::Critical,
            IncidentSeverity::Sev2 => Severity::High,
            IncidentSeverity::Sev3 => Severity::Medium,
            IncidentSeverity::Sev4 => Severity::Low,
        }
    }
}

impl fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentSeverity::Sev1 => "SEV1",
            IncidentSeverity::Sev2 => "SEV2",
            IncidentSeverity::Sev3 => "SEV3",
            IncidentSeverity::Sev4 => "SEV4",
        };
        f.write_str(s)
    }
}

/// Incident status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Identified,
    Monitoring,
    Resolved,
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Identified => "identified",
            IncidentStatus::Monitoring => "monitoring",
            IncidentStatus::Resolved => "resolved",
        };
        f.write_str(s)
    }
}

/// Kind of timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Created,
    Acknowledged,
    StatusChanged,
    Assigned,
    Escalated,
    Note,
    Resolved,
}

/// One entry in an incident's timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: TimelineKind,
    pub message: String,
    pub user: Option<String>,
}

/// An incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub alert_ids: Vec<Uuid>,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    /// First time the incident left `open`
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub timeline: Vec<TimelineEntry>,
    pub impact: Option<String>,
    pub root_cause: Option<String>,
    pub resolution: Option<String>,
    /// Channels notified about this incident
    pub channels: Vec<String>,
}

impl Incident {
    pub(crate) fn open(
        title: String,
        description: String,
        severity: IncidentSeverity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            severity,
            status: IncidentStatus::Open,
            alert_ids: Vec::new(),
            assigned_to: None,
            created_at: now,
            acknowledged_at: None,
            resolved_at: None,
            escalated_at: None,
            timeline: Vec::new(),
            impact: None,
            root_cause: None,
            resolution: None,
            channels: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == IncidentStatus::Resolved
    }

    pub(crate) fn record(
        &mut self,
        now: DateTime<Utc>,
        kind: TimelineKind,
        message: impl Into<String>,
        user: Option<&str>,
    ) {
        self.timeline.push(TimelineEntry {
            timestamp: now,
            kind,
            message: message.into(),
            user: user.map(str::to_string),
        });
    }

    /// Time from creation to first acknowledgement
    pub fn time_to_acknowledge(&self) -> Option<chrono::Duration> {
        self.acknowledged_at.map(|at| at - self.created_at)
    }

    /// Time from creation to resolution
    pub fn time_to_resolve(&self) -> Option<chrono::Duration> {
        self.resolved_at.map(|at| at - self.created_at)
    }
}

/// Operator changes to an incident; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentUpdate {
    pub status: Option<IncidentStatus>,
    pub impact: Option<String>,
    pub root_cause: Option<String>,
    pub resolution: Option<String>,
    pub assigned_to: Option<String>,
}

impl IncidentUpdate {
    pub fn status(status: IncidentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.impact.is_none()
            && self.root_cause.is_none()
            && self.resolution.is_none()
            && self.assigned_to.is_none()
    }
}
