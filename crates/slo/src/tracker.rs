//! SLO Tracker Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monitor_core::SourceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::SloError;

/// Percentage points below target still classified as at-risk
pub const AT_RISK_MARGIN: f64 = 0.5;

/// SLO configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Target percentage, e.g. 99.9
    pub target: f64,
    /// Measurement window in days
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Source metric identifier
    pub metric: String,
    /// Channels notified when the SLO is violated
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_window_days() -> u32 {
    30
}

impl SloDefinition {
    pub fn new(id: impl Into<String>, metric: impl Into<String>, target: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            target,
            window_days: default_window_days(),
            metric: metric.into(),
            channels: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), SloError> {
        if !(self.target > 0.0 && self.target <= 100.0) {
            return Err(SloError::InvalidTarget {
                id: self.id.clone(),
                target: self.target,
            });
        }
        if self.window_days == 0 {
            return Err(SloError::InvalidWindow(self.id.clone()));
        }
        Ok(())
    }
}

/// Health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SloStatus {
    Healthy,
    AtRisk,
    Violated,
}

impl fmt::Display for SloStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SloStatus::Healthy => "healthy",
            SloStatus::AtRisk => "at-risk",
            SloStatus::Violated => "violated",
        };
        f.write_str(s)
    }
}

/// Classify an actual percentage against a target
pub fn classify(target: f64, actual: f64) -> SloStatus {
    if actual >= target {
        SloStatus::Healthy
    } else if actual >= target - AT_RISK_MARGIN {
        SloStatus::AtRisk
    } else {
        SloStatus::Violated
    }
}

/// Result of one successful measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SloMeasurement {
    pub actual: f64,
    pub error_budget: f64,
    pub status: SloStatus,
    pub measured_at: DateTime<Utc>,
}

impl SloMeasurement {
    pub fn new(target: f64, actual: f64, measured_at: DateTime<Utc>) -> Self {
        Self {
            actual,
            error_budget: (100.0 - actual).max(0.0),
            status: classify(target, actual),
            measured_at,
        }
    }
}

/// An SLO with its last-known measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloState {
    pub definition: SloDefinition,
    pub last: Option<SloMeasurement>,
}

impl SloState {
    pub fn status(&self) -> Option<SloStatus> {
        self.last.map(|m| m.status)
    }
}

/// Status change observed during an evaluation
#[derive(Debug, Clone)]
pub struct SloTransition {
    pub definition: SloDefinition,
    pub from: Option<SloStatus>,
    pub measurement: SloMeasurement,
}

impl SloTransition {
    pub fn to(&self) -> SloStatus {
        self.measurement.status
    }

    /// Entered `violated` from any other (or no) status
    pub fn is_violation(&self) -> bool {
        self.to() == SloStatus::Violated && self.from != Some(SloStatus::Violated)
    }
}

/// External source of SLO measurements
#[async_trait]
pub trait SloSource: Send + Sync {
    /// Actual percentage for `metric` over the last `window_days`
    async fn measure(&self, metric: &str, window_days: u32) -> Result<f64, SourceError>;
}

/// Raw source result for one SLO, not yet applied to a tracker
#[derive(Debug)]
pub struct SloReading {
    pub id: String,
    pub result: Result<f64, SourceError>,
}

/// Query the source for every definition.
///
/// Touches no tracker state, so callers sharing a tracker behind a lock can
/// release it while the source is awaited and [`SloTracker::apply`] afterwards.
pub async fn measure_all(definitions: &[SloDefinition], source: &dyn SloSource) -> Vec<SloReading> {
    let mut readings = Vec::with_capacity(definitions.len());
    for def in definitions {
        readings.push(SloReading {
            id: def.id.clone(),
            result: source.measure(&def.metric, def.window_days).await,
        });
    }
    readings
}

/// Tracks every configured SLO
pub struct SloTracker {
    states: Vec<SloState>,
}

impl SloTracker {
    pub fn new(definitions: Vec<SloDefinition>) -> Self {
        info!("SLO tracker created with {} objectives", definitions.len());
        Self {
            states: definitions
                .into_iter()
                .map(|definition| SloState {
                    definition,
                    last: None,
                })
                .collect(),
        }
    }

    /// Measure every SLO once.
    ///
    /// An SLO whose source fails keeps its last-known measurement.
    pub async fn evaluate(
        &mut self,
        source: &dyn SloSource,
        now: DateTime<Utc>,
    ) -> Vec<SloTransition> {
        let readings = measure_all(&self.definitions(), source).await;
        self.apply(readings, now)
    }

    pub fn definitions(&self) -> Vec<SloDefinition> {
        self.states.iter().map(|s| s.definition.clone()).collect()
    }

    /// Record readings taken by [`measure_all`] and return status changes.
    ///
    /// Failed, non-finite, or out-of-range readings keep the last-known
    /// measurement. Readings for unknown ids are ignored.
    pub fn apply(&mut self, readings: Vec<SloReading>, now: DateTime<Utc>) -> Vec<SloTransition> {
        let mut transitions = Vec::new();

        for reading in readings {
            let Some(state) = self.states.iter_mut().find(|s| s.definition.id == reading.id) else {
                debug!(slo_id = %reading.id, "Reading for unknown SLO ignored");
                continue;
            };
            let def = &state.definition;
            let actual = match reading.result {
                Ok(actual) if actual.is_finite() && (0.0..=100.0).contains(&actual) => actual,
                Ok(actual) => {
                    warn!(slo_id = %def.id, actual, "SLO measurement out of range, keeping last value");
                    continue;
                }
                Err(e) => {
                    warn!(slo_id = %def.id, error = %e, "SLO measurement failed, keeping last value");
                    continue;
                }
            };

            let measurement = SloMeasurement::new(def.target, actual, now);
            let previous = state.status();
            debug!(
                slo_id = %def.id,
                actual,
                target = def.target,
                status = %measurement.status,
                "SLO measured"
            );

            if previous != Some(measurement.status) {
                info!(
                    slo_id = %def.id,
                    from = previous.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into()),
                    to = %measurement.status,
                    "SLO status changed"
                );
                transitions.push(SloTransition {
                    definition: def.clone(),
                    from: previous,
                    measurement,
                });
            }

            state.last = Some(measurement);
        }

        transitions
    }

    pub fn states(&self) -> &[SloState] {
        &self.states
    }

    pub fn get(&self, id: &str) -> Option<&SloState> {
        self.states.iter().find(|s| s.definition.id == id)
    }
}
