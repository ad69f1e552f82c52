//! Notification Routing
//!
//! Hands structured payloads to external channels:
//! - Each enabled channel gets at most one delivery attempt per event
//! - A failing channel is logged and never blocks the others
//! - Dispatch runs on a background task fed by a bounded queue

mod channel;
mod payload;
mod router;

pub use channel::{ChannelConfig, LogChannel, NotificationChannel};
pub use payload::{Notification, NotificationKind, NotificationPayload};
pub use router::{DispatchReport, NotificationQueue, NotificationRouter};

use std::time::Duration;
use thiserror::Error;

/// Notification delivery errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
