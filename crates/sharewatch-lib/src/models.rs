//! Core data models for the share monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A monitored file share: display name plus the provider resource ID
/// of the file service that hosts it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareTarget {
    pub name: String,
    pub resource_id: String,
}

impl ShareTarget {
    pub fn new(name: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// Error for a malformed `name:resourceId` target entry
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid share entry {0:?}: expected name:resourceId")]
pub struct TargetParseError(pub String);

impl FromStr for ShareTarget {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some((name, id)) if !name.is_empty() && !id.is_empty() => {
                Ok(ShareTarget::new(name, id))
            }
            _ => Err(TargetParseError(s.to_string())),
        }
    }
}

/// Parse a list of `name:resourceId` entries, logging and skipping
/// malformed ones
///
/// A share name is monitored once; later entries reusing it are dropped.
pub fn parse_share_targets<I, S>(entries: I) -> Vec<ShareTarget>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| !e.as_ref().trim().is_empty())
        .filter_map(|e| match e.as_ref().parse::<ShareTarget>() {
            Ok(target) => Some(target),
            Err(err) => {
                tracing::warn!(error = %err, "Skipping share entry");
                None
            }
        })
        .filter(|target| {
            let fresh = seen.insert(target.name.clone());
            if !fresh {
                tracing::warn!(share = %target.name, "Skipping duplicate share entry");
            }
            fresh
        })
        .collect()
}

/// Performance counters tracked per share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Iops,
    Bandwidth,
    Latency,
    Transactions,
}

impl MetricKind {
    /// Every tracked kind, in polling order
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Iops,
        MetricKind::Bandwidth,
        MetricKind::Latency,
        MetricKind::Transactions,
    ];

    /// Metric name as known to the metrics provider
    pub fn provider_name(&self) -> &'static str {
        match self {
            MetricKind::Iops => "FileShareMaxUsedIOPS",
            MetricKind::Bandwidth => "FileShareMaxUsedBandwidthMiBps",
            MetricKind::Latency => "SuccessE2ELatency",
            MetricKind::Transactions => "Transactions",
        }
    }

    /// Human-readable label used in alert messages
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Iops => "IOPS",
            MetricKind::Bandwidth => "Bandwidth MiB/s",
            MetricKind::Latency => "Latency ms",
            MetricKind::Transactions => "Transactions/s",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_name())
    }
}

/// Dimension filter narrowing a metrics query to one share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionFilter {
    pub share_name: String,
}

impl DimensionFilter {
    pub fn share(name: impl Into<String>) -> Self {
        Self {
            share_name: name.into(),
        }
    }

    /// OData expression understood by the metrics provider
    pub fn to_odata(&self) -> String {
        format!("FileShare eq '{}'", self.share_name.replace('\'', "''"))
    }
}

/// A single metric observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Composite key naming one detector and one alert slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub share: String,
    pub metric: MetricKind,
}

impl AlertKey {
    pub fn new(share: impl Into<String>, metric: MetricKind) -> Self {
        Self {
            share: share.into(),
            metric,
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.share, self.metric.provider_name())
    }
}

/// Share name and provisioned quota from the inventory provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareQuota {
    pub name: String,
    pub quota_gb: i32,
}

/// Enriched inventory record served by `/api/shares`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareInfo {
    pub name: String,
    #[serde(rename = "quotaGB")]
    pub quota_gb: i32,
    pub iops: f64,
    #[serde(rename = "bandwidthMiB")]
    pub bandwidth_mib: f64,
    #[serde(rename = "latencyMs")]
    pub latency_ms: f64,
    pub transactions: f64,
}

impl ShareInfo {
    /// Record with quota set and all metric fields zeroed
    pub fn new(name: impl Into<String>, quota_gb: i32) -> Self {
        Self {
            name: name.into(),
            quota_gb,
            iops: 0.0,
            bandwidth_mib: 0.0,
            latency_ms: 0.0,
            transactions: 0.0,
        }
    }

    /// Set the field corresponding to `kind`
    pub fn set_metric(&mut self, kind: MetricKind, value: f64) {
        match kind {
            MetricKind::Iops => self.iops = value,
            MetricKind::Bandwidth => self.bandwidth_mib = value,
            MetricKind::Latency => self.latency_ms = value,
            MetricKind::Transactions => self.transactions = value,
        }
    }
}
