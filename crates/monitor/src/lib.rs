//! Monitoring Engine
//!
//! Wires rule evaluation, incident management, SLO tracking, notification
//! dispatch, and reporting into one engine driven by a scheduler.

pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod source;

pub use crate::config::{LoggingConfig, MonitorConfig};
pub use engine::{EngineDeps, MonitoringEngine, TickOutcome, TickReport};
pub use error::MonitorError;
pub use scheduler::{IntervalTicker, ManualTicker, Scheduler, SchedulerHandle, TickSender, Ticker};
pub use source::{FileMetricSource, MetricSource};

use incidents::RotationSchedule;
use metrics_exporter_prometheus::PrometheusBuilder;
use monitor_core::SystemClock;
use notify::{LogChannel, NotificationRouter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) {
    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
            .expect("Failed to set tracing subscriber");
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .expect("Failed to set tracing subscriber");
    }
}

/// Serve Prometheus metrics on `addr`
pub fn install_metrics_exporter(addr: &str) -> Result<(), MonitorError> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| MonitorError::Metrics(format!("invalid listen address {addr}: {e}")))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MonitorError::Metrics(e.to_string()))?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Register a transport for every configured channel the binary can serve
pub fn build_router(config: &MonitorConfig) -> NotificationRouter {
    let mut router = NotificationRouter::new().with_send_timeout(config.notification_timeout());
    for channel in &config.channels {
        match channel.kind.as_str() {
            "log" => router.register(channel.clone(), Arc::new(LogChannel)),
            other => warn!(
                channel_id = %channel.id,
                kind = other,
                "No transport for channel type, notifications to it will be skipped"
            ),
        }
    }
    router
}

/// A running engine with its scheduler and notification dispatcher
pub struct Monitor {
    pub engine: Arc<MonitoringEngine>,
    scheduler: SchedulerHandle,
    dispatcher: JoinHandle<()>,
}

impl Monitor {
    /// Stop the scheduler, then drain queued notifications.
    ///
    /// Waits for the dispatcher, so any other clone of `engine` must be dropped first.
    pub async fn shutdown(self) {
        info!("Shutting down monitor");
        self.scheduler.stop().await;
        // the dispatcher ends once the engine's queue handle is gone
        drop(self.engine);
        if let Err(e) = self.dispatcher.await {
            warn!("Notification dispatcher ended abnormally: {}", e);
        }
        info!("Monitor stopped");
    }
}

/// Build the engine from configuration and start scheduling
pub fn start(config: &MonitorConfig) -> Result<Monitor, MonitorError> {
    let metrics_file = config.metrics_file.clone().ok_or_else(|| {
        MonitorError::InvalidConfig("metrics_file is required to run the monitor".into())
    })?;
    let source = Arc::new(FileMetricSource::new(metrics_file));

    let (notifications, dispatcher) =
        build_router(config).spawn(config.notification_queue_capacity);

    let engine = Arc::new(MonitoringEngine::new(
        config,
        EngineDeps {
            metrics: source.clone(),
            slo_source: source,
            notifications,
            on_call: Arc::new(RotationSchedule::new(config.on_call.clone())),
            clock: Arc::new(SystemClock),
        },
    ));

    let scheduler = Scheduler::from_config(engine.clone(), config).start();
    info!(
        tick_secs = config.tick_interval_secs,
        slo_secs = config.slo_interval_secs,
        "Monitor started"
    );

    Ok(Monitor {
        engine,
        scheduler,
        dispatcher,
    })
}
