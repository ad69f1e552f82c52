//! Monitoring Configuration

use alerting::AlertRule;
use incidents::Shift;
use notify::ChannelConfig;
use serde::{Deserialize, Serialize};
use slo::SloDefinition;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::MonitorError;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Max level: trace, debug, info, warn, error (default: info)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Engine configuration, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Rule evaluation interval in seconds (default: 30)
    pub tick_interval_secs: u64,
    /// SLO evaluation interval in seconds; 0 evaluates SLOs on every tick (default: 300)
    pub slo_interval_secs: u64,
    /// Escalate incidents unacknowledged this long; 0 disables (default: 900)
    pub escalation_after_secs: u64,
    /// Rules listed in the report frequency ranking (default: 5)
    pub report_top_n: usize,
    /// Pending notifications before new ones are dropped (default: 256)
    pub notification_queue_capacity: usize,
    /// Per-channel delivery timeout in seconds (default: 10)
    pub notification_timeout_secs: u64,
    /// Channels used when a rule or SLO names none
    pub default_channels: Vec<String>,
    pub logging: LoggingConfig,
    /// Prometheus exporter listen address, e.g. "0.0.0.0:9100"
    pub metrics_addr: Option<String>,
    /// JSON metrics file read by `monitord`
    pub metrics_file: Option<PathBuf>,
    pub channels: Vec<ChannelConfig>,
    pub rules: Vec<AlertRule>,
    pub slos: Vec<SloDefinition>,
    pub on_call: Vec<Shift>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            slo_interval_secs: 300,
            escalation_after_secs: 900,
            report_top_n: 5,
            notification_queue_capacity: 256,
            notification_timeout_secs: 10,
            default_channels: Vec::new(),
            logging: LoggingConfig::default(),
            metrics_addr: None,
            metrics_file: None,
            channels: Vec::new(),
            rules: Vec::new(),
            slos: Vec::new(),
            on_call: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Load from a TOML/YAML/JSON file with `MONITOR__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("MONITOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: MonitorConfig = settings.try_deserialize()?;
        config.validate()?;
        info!(
            path = %path.display(),
            rules = config.rules.len(),
            slos = config.slos.len(),
            channels = config.channels.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Reject configurations the engine cannot run safely
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.tick_interval_secs == 0 {
            return Err(invalid("tick_interval_secs must be greater than zero"));
        }

        let mut channel_ids = HashSet::new();
        for channel in &self.channels {
            if !channel_ids.insert(channel.id.as_str()) {
                return Err(invalid(format!("duplicate channel id: {}", channel.id)));
            }
        }
        let check_channels = |owner: &str, channels: &[String]| {
            match channels.iter().find(|c| !channel_ids.contains(c.as_str())) {
                Some(unknown) => Err(invalid(format!("{owner} references unknown channel: {unknown}"))),
                None => Ok(()),
            }
        };
        check_channels("default_channels", &self.default_channels)?;

        let mut rule_ids = HashSet::new();
        for rule in &self.rules {
            if !rule_ids.insert(rule.id.as_str()) {
                return Err(invalid(format!("duplicate rule id: {}", rule.id)));
            }
            if !rule.condition.threshold.is_finite() {
                return Err(invalid(format!("rule {}: threshold must be finite", rule.id)));
            }
            check_channels(&format!("rule {}", rule.id), &rule.channels)?;
        }

        let mut slo_ids = HashSet::new();
        for slo in &self.slos {
            if !slo_ids.insert(slo.id.as_str()) {
                return Err(invalid(format!("duplicate SLO id: {}", slo.id)));
            }
            slo.validate()
                .map_err(|e| MonitorError::InvalidConfig(e.to_string()))?;
            check_channels(&format!("SLO {}", slo.id), &slo.channels)?;
        }

        for shift in &self.on_call {
            if shift.end <= shift.start {
                return Err(invalid(format!(
                    "on-call shift for {} ends before it starts",
                    shift.engineer
                )));
            }
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// `None` when SLOs share the rule tick
    pub fn slo_interval(&self) -> Option<Duration> {
        (self.slo_interval_secs > 0).then(|| Duration::from_secs(self.slo_interval_secs))
    }

    /// `None` when escalation is disabled
    pub fn escalation_after(&self) -> Option<chrono::Duration> {
        (self.escalation_after_secs > 0)
            .then(|| chrono::Duration::seconds(self.escalation_after_secs as i64))
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }
}

fn invalid(message: impl Into<String>) -> MonitorError {
    MonitorError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{CompareOp, Condition};
    use monitor_core::Severity;

    fn cpu_rule() -> AlertRule {
        AlertRule::new(
            "cpu-high",
            "High CPU",
            Severity::High,
            Condition::new("cpu", CompareOp::GreaterThan, 80.0),
        )
        .with_channels(["ops"])
    }

    fn valid() -> MonitorConfig {
        MonitorConfig {
            channels: vec![ChannelConfig::new("ops", "log")],
            default_channels: vec!["ops".into()],
            rules: vec![cpu_rule()],
            slos: vec![SloDefinition::new("api", "availability", 99.9)],
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(30));
        assert_eq!(config.slo_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.escalation_after(), Some(chrono::Duration::minutes(15)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_channel() {
        let mut config = valid();
        config.rules[0].channels = vec!["pager".into()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown channel: pager"));
    }

    #[test]
    fn test_rejects_duplicate_rule() {
        let mut config = valid();
        config.rules.push(cpu_rule());
        assert!(config.validate().unwrap_err().to_string().contains("duplicate rule id"));
    }

    #[test]
    fn test_rejects_bad_slo_target() {
        let mut config = valid();
        config.slos[0].target = 120.0;
        assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_nan_threshold() {
        let mut config = valid();
        config.rules[0].condition.threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_toml_file() {
        let path = std::env::temp_dir().join(format!("monitor-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
tick_interval_secs = 15
default_channels = ["ops"]

[[channels]]
id = "ops"
type = "log"

[[rules]]
id = "cpu-high"
name = "High CPU"
severity = "high"
channels = ["ops"]
runbook = "https://runbooks.example/cpu"
condition = { metric = "cpu", operator = ">", threshold = 80.0 }

[[slos]]
id = "api"
name = "API availability"
target = 99.9
metric = "availability"
"#,
        )
        .unwrap();

        let config = MonitorConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.tick_interval_secs, 15);
        assert_eq!(config.slo_interval_secs, 300);
        assert_eq!(config.rules[0].condition.operator, CompareOp::GreaterThan);
        assert_eq!(config.rules[0].runbook.as_deref(), Some("https://runbooks.example/cpu"));
        assert_eq!(config.slos[0].window_days, 30);
        assert_eq!(config.channels[0].kind, "log");
    }
}
