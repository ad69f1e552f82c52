//! Incident Management
//!
//! Incidents are opened from critical/high alerts (or declared by an
//! operator), assigned to whoever is on call, tracked through an ordered
//! timeline, escalated when nobody picks them up, and resolved either by
//! an operator or by the recovery of their triggering alert.

mod error;
mod incident;
mod manager;
mod oncall;

pub use error::IncidentError;
pub use incident::{
    Incident, IncidentSeverity, IncidentStatus, IncidentUpdate, TimelineEntry, TimelineKind,
};
pub use manager::{IncidentManager, ALERT_RESOLVED_REASON};
pub use oncall::{OnCallDirectory, RotationSchedule, Shift};
