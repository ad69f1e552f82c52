//! Alert Error Types

use crate::manager::AlertStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors from alert lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    /// No alert with this id
    #[error("Alert {0} not found")]
    NotFound(Uuid),

    /// Transition not allowed from the current status
    #[error("Cannot {operation} alert {id} in status {status}")]
    InvalidState {
        id: Uuid,
        status: AlertStatus,
        operation: &'static str,
    },
}
