//! Monitoring Core Types
//!
//! Types shared by every stage of the monitoring engine:
//! - Alert severity levels
//! - Metric snapshots handed in by the metric source
//! - Injectable clocks
//! - Collaborator errors

mod clock;
mod error;
mod severity;
mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SourceError;
pub use severity::Severity;
pub use snapshot::MetricSnapshot;
