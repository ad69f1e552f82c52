//! Metric Sources

use async_trait::async_trait;
use monitor_core::{Clock, MetricSnapshot, SourceError, SystemClock};
use slo::SloSource;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Supplies the current metric snapshot on each tick
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn snapshot(&self) -> Result<MetricSnapshot, SourceError>;
}

/// Reads a flat JSON object of `{ "metric": value }` from disk on every call.
///
/// Serves both rule snapshots and SLO measurements; the SLO window is
/// expected to be pre-aggregated by whatever writes the file.
pub struct FileMetricSource {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileMetricSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn read(&self) -> Result<HashMap<String, f64>, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let values: HashMap<String, f64> = serde_json::from_str(&raw)
            .map_err(|e| SourceError::InvalidData(format!("{}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), metrics = values.len(), "Metrics file read");
        Ok(values)
    }
}

#[async_trait]
impl MetricSource for FileMetricSource {
    async fn snapshot(&self) -> Result<MetricSnapshot, SourceError> {
        let values = self.read().await?;
        Ok(MetricSnapshot {
            timestamp: self.clock.now(),
            values,
        })
    }
}

#[async_trait]
impl SloSource for FileMetricSource {
    async fn measure(&self, metric: &str, _window_days: u32) -> Result<f64, SourceError> {
        self.read()
            .await?
            .get(metric)
            .copied()
            .ok_or_else(|| SourceError::MissingMetric(metric.to_string()))
    }
}
