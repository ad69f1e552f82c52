//! Monitoring Reports
//!
//! Aggregates alert, incident, and SLO history over a time window into a
//! structured report. Rendering is left to the consumer.

mod builder;

pub use builder::{
    AlertSummary, IncidentSummary, MonitoringReport, ReportBuilder, RuleFrequency, SloSnapshot,
};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Report errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("Invalid report range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
