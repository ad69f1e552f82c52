//! Evaluation Scheduler
//!
//! Drives rule ticks and SLO cycles from injectable tickers. Each tick runs on
//! its own task so a slow evaluation never delays the timer; the engine skips
//! a tick that arrives while the previous one is still running.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::engine::{MonitoringEngine, TickOutcome};

/// Source of scheduler ticks
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. Returns false once the ticker is exhausted.
    async fn tick(&mut self) -> bool;
}

/// Wall-clock ticker on a fixed period
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    /// First tick fires immediately
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticker driven by hand through a [`TickSender`]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Fires a [`ManualTicker`]; dropping every sender exhausts it
#[derive(Clone)]
pub struct TickSender {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, TickSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, TickSender { tx })
    }
}

impl TickSender {
    /// Returns false if the ticker has been dropped
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// Periodic driver for a [`MonitoringEngine`]
pub struct Scheduler {
    engine: Arc<MonitoringEngine>,
    rule_ticker: Box<dyn Ticker>,
    /// `None` evaluates SLOs after every rule tick
    slo_ticker: Option<Box<dyn Ticker>>,
}

impl Scheduler {
    pub fn new(engine: Arc<MonitoringEngine>, rule_ticker: Box<dyn Ticker>) -> Self {
        Self {
            engine,
            rule_ticker,
            slo_ticker: None,
        }
    }

    pub fn with_slo_ticker(mut self, ticker: Box<dyn Ticker>) -> Self {
        self.slo_ticker = Some(ticker);
        self
    }

    /// Interval tickers at the configured periods
    pub fn from_config(engine: Arc<MonitoringEngine>, config: &MonitorConfig) -> Self {
        let scheduler = Self::new(engine, Box::new(IntervalTicker::new(config.tick_interval())));
        match config.slo_interval() {
            Some(period) => scheduler.with_slo_ticker(Box::new(IntervalTicker::new(period))),
            None => scheduler,
        }
    }

    /// Start the loop on a background task
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Scheduler {
            engine,
            mut rule_ticker,
            mut slo_ticker,
        } = self;
        let slo_on_rule_tick = slo_ticker.is_none();
        let mut tasks = JoinSet::new();

        info!(slo_on_rule_tick, "Scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                alive = rule_ticker.tick() => {
                    if !alive {
                        debug!("Rule ticker exhausted");
                        break;
                    }
                    let engine = engine.clone();
                    tasks.spawn(async move {
                        run_tick(&engine).await;
                        if slo_on_rule_tick {
                            engine.evaluate_slos().await;
                        }
                    });
                }
                alive = next_tick(&mut slo_ticker) => {
                    if !alive {
                        debug!("SLO ticker exhausted");
                        slo_ticker = None;
                        continue;
                    }
                    let engine = engine.clone();
                    tasks.spawn(async move {
                        engine.evaluate_slos().await;
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Evaluation task failed: {}", e);
                    }
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight evaluations");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Evaluation task failed: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

async fn next_tick(ticker: &mut Option<Box<dyn Ticker>>) -> bool {
    match ticker {
        Some(ticker) => ticker.tick().await,
        None => std::future::pending().await,
    }
}

async fn run_tick(engine: &MonitoringEngine) {
    match engine.tick().await {
        Ok(TickOutcome::Completed(report)) => debug!(?report, "Rule tick finished"),
        Ok(TickOutcome::Skipped) => {}
        Err(e) => warn!("Rule evaluation failed, state unchanged: {}", e),
    }
}

/// Handle to a running [`Scheduler`]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop scheduling and wait for in-flight evaluations to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineDeps;
    use crate::source::MetricSource;
    use alerting::{AlertRule, CompareOp, Condition};
    use chrono::{TimeZone, Utc};
    use incidents::RotationSchedule;
    use monitor_core::{ManualClock, MetricSnapshot, Severity, SourceError};
    use notify::{ChannelConfig, Notification, NotificationQueue};
    use slo::{SloDefinition, SloSource};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always reports cpu at 90 and availability at 99.0; counts calls
    #[derive(Default)]
    struct CountingSource {
        snapshots: AtomicUsize,
        measurements: AtomicUsize,
    }

    #[async_trait]
    impl MetricSource for CountingSource {
        async fn snapshot(&self) -> Result<MetricSnapshot, SourceError> {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            Ok(MetricSnapshot::new(Utc::now()).with("cpu", 90.0))
        }
    }

    #[async_trait]
    impl SloSource for CountingSource {
        async fn measure(&self, _metric: &str, _window_days: u32) -> Result<f64, SourceError> {
            self.measurements.fetch_add(1, Ordering::SeqCst);
            Ok(99.0)
        }
    }

    fn engine(source: Arc<CountingSource>) -> (Arc<MonitoringEngine>, mpsc::Receiver<Notification>) {
        let config = MonitorConfig {
            channels: vec![ChannelConfig::new("ops", "log")],
            default_channels: vec!["ops".into()],
            rules: vec![AlertRule::new(
                "cpu-high",
                "High CPU",
                Severity::Medium,
                Condition::new("cpu", CompareOp::GreaterThan, 80.0),
            )],
            slos: vec![SloDefinition::new("api", "availability", 99.9)],
            ..Default::default()
        };
        let (queue, rx) = NotificationQueue::channel(16);
        let engine = MonitoringEngine::new(
            &config,
            EngineDeps {
                metrics: source.clone(),
                slo_source: source,
                notifications: queue,
                on_call: Arc::new(RotationSchedule::default()),
                clock: Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())),
            },
        );
        (Arc::new(engine), rx)
    }

    #[tokio::test]
    async fn test_manual_ticks_drive_engine() {
        let source = Arc::new(CountingSource::default());
        let (engine, mut rx) = engine(source.clone());
        let (ticker, ticks) = ManualTicker::new();

        let handle = Scheduler::new(engine.clone(), Box::new(ticker)).start();
        assert!(ticks.fire());
        drop(ticks);

        // exhausting the ticker ends the loop after in-flight ticks finish
        handle.task.await.unwrap();

        assert_eq!(source.snapshots.load(Ordering::SeqCst), 1);
        // SLOs follow the rule tick when no SLO ticker is set
        assert_eq!(source.measurements.load(Ordering::SeqCst), 1);
        assert_eq!(engine.active_alerts().await.len(), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_separate_slo_ticker() {
        let source = Arc::new(CountingSource::default());
        let (engine, _rx) = engine(source.clone());
        let (rules, rule_ticks) = ManualTicker::new();
        let (slos, slo_ticks) = ManualTicker::new();

        let handle = Scheduler::new(engine, Box::new(rules))
            .with_slo_ticker(Box::new(slos))
            .start();
        slo_ticks.fire();
        drop(slo_ticks);
        while source.measurements.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        rule_ticks.fire();
        drop(rule_ticks);
        handle.task.await.unwrap();

        assert_eq!(source.snapshots.load(Ordering::SeqCst), 1);
        assert_eq!(source.measurements.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_halts_loop() {
        let source = Arc::new(CountingSource::default());
        let (engine, _rx) = engine(source.clone());
        let (ticker, _ticks) = ManualTicker::new();

        let handle = Scheduler::new(engine, Box::new(ticker)).start();
        assert!(!handle.is_finished());
        handle.stop().await;
        assert_eq!(source.snapshots.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker() {
        let mut ticker = IntervalTicker::new(Duration::from_secs(30));
        let start = tokio::time::Instant::now();
        assert!(ticker.tick().await);
        assert!(ticker.tick().await);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }
}
