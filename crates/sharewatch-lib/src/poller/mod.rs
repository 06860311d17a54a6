//! Polling of share performance counters
//!
//! Drives one anomaly detector per (share, metric) pair from the metrics
//! provider on a fixed cadence and records detected spikes.

mod r#loop;

pub use r#loop::{alert_message, CycleResults, Poller, PollerBuilder, PollerConfig};
