//! On-Call Directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Answers "who is on call now"
pub trait OnCallDirectory: Send + Sync {
    fn current_on_call(&self, at: DateTime<Utc>) -> Option<String>;
}

/// One on-call shift, `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub engineer: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Explicit shift schedule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotationSchedule {
    shifts: Vec<Shift>,
}

impl RotationSchedule {
    pub fn new(mut shifts: Vec<Shift>) -> Self {
        shifts.sort_by_key(|s| s.start);
        Self { shifts }
    }

    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }
}

impl OnCallDirectory for RotationSchedule {
    fn current_on_call(&self, at: DateTime<Utc>) -> Option<String> {
        let engineer = self
            .shifts
            .iter()
            .find(|s| s.start <= at && at < s.end)
            .map(|s| s.engineer.clone());

        if engineer.is_none() {
            debug!(%at, "No on-call shift covers this time");
        }
        engineer
    }
}
