//! Core library for the file share monitor
//!
//! This crate provides the core functionality for:
//! - Sliding-window anomaly detection on share performance counters
//! - The shared registry of active anomaly alerts
//! - The polling loop that feeds detectors from the metrics provider
//! - Inventory listings joined with live metric values
//! - The read-only HTTP JSON API
//! - Health checks and observability

pub mod anomaly;
pub mod api;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod poller;
pub mod sources;

pub use anomaly::{AlertRegistry, AlertRetention, SpikeAnomaly, ZScoreDetector};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inventory::InventoryView;
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use poller::{Poller, PollerBuilder, PollerConfig};
pub use sources::{InventoryError, InventorySource, MetricsError, MetricsSource};
