//! Alerting System
//!
//! Evaluates threshold rules against metric snapshots, deduplicates
//! firing alerts per rule, and drives the alert lifecycle
//! (firing -> acknowledged -> resolved).

mod engine;
mod error;
mod manager;
mod rule;

pub use engine::{AlertTransition, RuleEngine};
pub use error::AlertError;
pub use manager::{Alert, AlertManager, AlertStatus};
pub use rule::{AlertRule, CompareOp, Condition};
