//! Anomaly detection for share performance counters
//!
//! This module provides:
//! - Windowed z-score spike detection per (share, metric) series
//! - The shared registry of active alerts

mod detector;
mod registry;

pub use detector::{
    SpikeAnomaly, StatsError, WindowStats, ZScoreDetector, DEFAULT_THRESHOLD, DEFAULT_WINDOW_SIZE,
};
pub use registry::{AlertRegistry, AlertRetention};
