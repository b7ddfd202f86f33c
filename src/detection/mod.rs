//! Detection module - edge detection and status aggregation

mod aggregate;
mod edge;

pub use aggregate::{recompute, AggregateStatus, OverallStatus, OverviewRow, SourceState};
pub use edge::is_alarm_edge;
