//! Notification Payloads

use chrono::{DateTime, Utc};
use monitor_core::Severity;
use serde::{Deserialize, Serialize};

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    AlertFired,
    AlertResolved,
    IncidentOpened,
    IncidentEscalated,
    IncidentResolved,
    SloViolated,
}

/// Structured payload handed to a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub runbook: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A payload together with the channels it is routed to
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub payload: NotificationPayload,
    pub channels: Vec<String>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            payload: NotificationPayload {
                kind,
                severity,
                title: title.into(),
                message: message.into(),
                runbook: None,
                timestamp,
            },
            channels: Vec::new(),
        }
    }

    pub fn with_runbook(mut self, runbook: Option<String>) -> Self {
        self.payload.runbook = runbook;
        self
    }

    pub fn to_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    pub fn kind(&self) -> NotificationKind {
        self.payload.kind
    }
}
