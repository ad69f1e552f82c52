//! Incident Error Types

use crate::incident::IncidentStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors from incident operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncidentError {
    /// No incident with this id
    #[error("Incident {0} not found")]
    NotFound(Uuid),

    /// Operation not allowed in the current status
    #[error("Cannot {operation} incident {id} in status {status}")]
    InvalidState {
        id: Uuid,
        status: IncidentStatus,
        operation: &'static str,
    },
}
