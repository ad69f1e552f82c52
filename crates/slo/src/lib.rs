//! SLO Tracking
//!
//! Measures each configured service level objective against its target,
//! derives the remaining error budget, and classifies health as
//! healthy, at-risk, or violated.

mod tracker;

pub use tracker::{
    classify, measure_all, SloDefinition, SloMeasurement, SloReading, SloSource, SloState,
    SloStatus, SloTracker, SloTransition, AT_RISK_MARGIN,
};

use thiserror::Error;

/// SLO configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SloError {
    #[error("SLO {id}: target {target} must be within (0, 100]")]
    InvalidTarget { id: String, target: f64 },

    #[error("SLO {0}: measurement window must be at least one day")]
    InvalidWindow(String),
}
