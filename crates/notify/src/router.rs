//! Notification Router and Dispatch Queue

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelConfig, NotificationChannel};
use crate::payload::Notification;
use crate::NotifyError;

/// Default per-channel delivery timeout
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

struct RegisteredChannel {
    config: ChannelConfig,
    transport: Arc<dyn NotificationChannel>,
}

/// Per-event delivery outcome
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
    /// Unknown or disabled channels
    pub skipped: Vec<String>,
}

/// Routes notifications to registered channels
pub struct NotificationRouter {
    channels: HashMap<String, RegisteredChannel>,
    send_timeout: Duration,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Register a channel under its configured id, replacing any previous one
    pub fn register(&mut self, config: ChannelConfig, transport: Arc<dyn NotificationChannel>) {
        debug!(
            channel_id = %config.id,
            transport = transport.channel_type(),
            enabled = config.enabled,
            "Channel registered"
        );
        self.channels
            .insert(config.id.clone(), RegisteredChannel { config, transport });
    }

    pub fn has_channel(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    pub fn channel_ids(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    /// Deliver to every enabled channel the notification is routed to.
    ///
    /// One attempt per channel; failures are logged and do not stop the others.
    pub async fn dispatch(&self, notification: &Notification) -> DispatchReport {
        let mut report = DispatchReport::default();
        let payload = &notification.payload;

        for id in &notification.channels {
            let Some(channel) = self.channels.get(id) else {
                warn!(channel_id = %id, "Unknown notification channel, skipped");
                report.skipped.push(id.clone());
                continue;
            };
            if !channel.config.enabled {
                debug!(channel_id = %id, "Channel disabled, skipped");
                report.skipped.push(id.clone());
                continue;
            }

            let result = match tokio::time::timeout(self.send_timeout, channel.transport.send(payload)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(self.send_timeout)),
            };

            match result {
                Ok(()) => {
                    metrics::counter!("notifications_sent_total", "channel" => id.clone()).increment(1);
                    report.delivered.push(id.clone());
                }
                Err(e) => {
                    metrics::counter!("notifications_failed_total", "channel" => id.clone()).increment(1);
                    error!(
                        channel_id = %id,
                        transport = channel.transport.channel_type(),
                        error = %e,
                        "Failed to send notification"
                    );
                    report.failed.push(id.clone());
                }
            }
        }

        debug!(
            kind = ?payload.kind,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Notification dispatched"
        );
        report
    }

    /// Run the router on a background task fed by a bounded queue
    pub fn spawn(self, capacity: usize) -> (NotificationQueue, JoinHandle<()>) {
        let (queue, mut rx) = NotificationQueue::channel(capacity);
        let handle = tokio::spawn(async move {
            info!("Notification dispatcher started");
            while let Some(notification) = rx.recv().await {
                self.dispatch(&notification).await;
            }
            info!("Notification dispatcher stopped");
        });
        (queue, handle)
    }
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking handle for enqueueing notifications
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    /// Create a queue and the receiving end it feeds
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting. A full or closed queue drops the notification.
    pub fn enqueue(&self, notification: Notification) {
        if notification.channels.is_empty() {
            debug!(kind = ?notification.kind(), "Notification has no channels, dropped");
            return;
        }
        if let Err(e) = self.tx.try_send(notification) {
            warn!("Notification dropped: {}", e);
        }
    }
}
