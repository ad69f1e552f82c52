//! Collaborator Error Types

use thiserror::Error;

/// Failure reported by an external collaborator (metric or SLO source)
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Source could not be reached
    #[error("Metric source unavailable: {0}")]
    Unavailable(String),

    /// Source answered but did not have the requested metric
    #[error("Metric not reported: {0}")]
    MissingMetric(String),

    /// Source returned data that could not be decoded
    #[error("Invalid metric data: {0}")]
    InvalidData(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}
