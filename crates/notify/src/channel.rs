//! Notification Channels

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::payload::NotificationPayload;
use crate::NotifyError;

/// Routing address of a channel. The `config` blob is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    /// Transport type, e.g. `"log"`, `"email"`, `"slack"`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ChannelConfig {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            config: serde_json::Value::Null,
            enabled: true,
        }
    }
}

/// Transport that delivers a payload to an external service
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver once. No retries.
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;

    /// Transport type name
    fn channel_type(&self) -> &str;
}

/// Writes payloads to the log as JSON
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| NotifyError::Serialization(e.to_string()))?;
        info!(target: "notifications", severity = %payload.severity, "{}", body);
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "log"
    }
}
