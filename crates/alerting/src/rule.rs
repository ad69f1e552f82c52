//! Alert Rule Definitions

use monitor_core::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Comparison applied as `value <op> threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">", alias = "gt")]
    GreaterThan,
    #[serde(rename = "<", alias = "lt")]
    LessThan,
    #[serde(rename = ">=", alias = "gte")]
    GreaterEqual,
    #[serde(rename = "<=", alias = "lte")]
    LessEqual,
    #[serde(rename = "==", alias = "eq")]
    Equal,
    #[serde(rename = "!=", alias = "ne")]
    NotEqual,
}

impl CompareOp {
    /// Whether `value <op> threshold` holds
    pub fn check(self, value: f64, threshold: f64) -> bool {
        match self {
            CompareOp::GreaterThan => value > threshold,
            CompareOp::LessThan => value < threshold,
            CompareOp::GreaterEqual => value >= threshold,
            CompareOp::LessEqual => value <= threshold,
            CompareOp::Equal => value == threshold,
            CompareOp::NotEqual => value != threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::GreaterThan => ">",
            CompareOp::LessThan => "<",
            CompareOp::GreaterEqual => ">=",
            CompareOp::LessEqual => "<=",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Threshold condition on a single metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric: String,
    pub operator: CompareOp,
    pub threshold: f64,
}

impl Condition {
    pub fn new(metric: impl Into<String>, operator: CompareOp, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            operator,
            threshold,
        }
    }

    pub fn holds(&self, value: f64) -> bool {
        self.operator.check(value, self.threshold)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.metric, self.operator, self.threshold)
    }
}

/// Alert rule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub condition: Condition,
    /// How long the condition must hold before firing (seconds, 0 = immediately)
    #[serde(default)]
    pub duration_secs: u64,
    /// Notification channel ids
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub runbook: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    /// Create an enabled rule that fires immediately
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
        condition: Condition,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            severity,
            condition,
            duration_secs: 0,
            channels: Vec::new(),
            runbook: None,
            enabled: true,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_secs = duration.as_secs();
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_runbook(mut self, runbook: impl Into<String>) -> Self {
        self.runbook = Some(runbook.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Sustained duration required before firing
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Human-readable alert message for a breaching value
    pub fn message(&self, value: f64) -> String {
        format!("{}: {} (current: {:.2})", self.name, self.condition, value)
    }
}
