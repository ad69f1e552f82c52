//! Monitoring Engine Error Types

use alerting::AlertError;
use incidents::IncidentError;
use monitor_core::SourceError;
use reporting::ReportError;
use thiserror::Error;

/// Errors surfaced by the monitoring engine
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Incident(#[from] IncidentError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Metric source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),
}

impl MonitorError {
    /// Unknown alert or incident id
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MonitorError::Alert(AlertError::NotFound(_))
                | MonitorError::Incident(IncidentError::NotFound(_))
        )
    }

    /// Transition not allowed from the current status
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            MonitorError::Alert(AlertError::InvalidState { .. })
                | MonitorError::Incident(IncidentError::InvalidState { .. })
        )
    }
}
