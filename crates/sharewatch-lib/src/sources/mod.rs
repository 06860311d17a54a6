//! External metric and inventory providers
//!
//! The monitor only talks to the outside world through the
//! [`MetricsSource`] and [`InventorySource`] traits, so the core can be
//! driven by deterministic fakes in tests.

mod azure;

pub use azure::{AzureClientConfig, AzureFileShares, AzureMonitorMetrics, METRICS_LOOKBACK};

use crate::models::{DimensionFilter, MetricKind, MetricSample, ShareQuota};
use thiserror::Error;

pub use async_trait::async_trait;

/// Errors from the metrics provider
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("no data points for {metric} in the lookback window")]
    NoData { metric: String },

    #[error("metrics request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metrics provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid metrics resource path: {0}")]
    InvalidResource(String),

    #[error("metrics source not configured: {0}")]
    NotConfigured(String),
}

/// Errors from the inventory provider
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("inventory provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid inventory resource path: {0}")]
    InvalidResource(String),

    #[error("inventory source not configured: {0}")]
    NotConfigured(String),
}

/// Provider of the latest performance counter values
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch the most recent value of `metric` for the resource, narrowed
    /// by `filter`
    async fn get_metric(
        &self,
        resource_id: &str,
        metric: MetricKind,
        filter: &DimensionFilter,
    ) -> Result<MetricSample, MetricsError>;
}

/// Provider of the share inventory
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List every share with its provisioned quota
    async fn list(&self) -> Result<Vec<ShareQuota>, InventoryError>;
}

/// Placeholder used when no inventory credentials are configured
///
/// Every listing fails, which the API reports as a 500.
#[derive(Debug, Clone)]
pub struct UnconfiguredInventory {
    reason: String,
}

impl UnconfiguredInventory {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl InventorySource for UnconfiguredInventory {
    async fn list(&self) -> Result<Vec<ShareQuota>, InventoryError> {
        Err(InventoryError::NotConfigured(self.reason.clone()))
    }
}

/// Placeholder used when no metrics credentials are configured
#[derive(Debug, Clone)]
pub struct UnconfiguredMetrics {
    reason: String,
}

impl UnconfiguredMetrics {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MetricsSource for UnconfiguredMetrics {
    async fn get_metric(
        &self,
        _resource_id: &str,
        _metric: MetricKind,
        _filter: &DimensionFilter,
    ) -> Result<MetricSample, MetricsError> {
        Err(MetricsError::NotConfigured(self.reason.clone()))
    }
}
