//! Registry of active anomaly alerts
//!
//! Holds the latest alert message per (share, metric) key. The poller is
//! the only writer; API handlers read point-in-time snapshots.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// How long an alert stays visible once raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertRetention {
    /// Alerts persist until overwritten by a later detection
    #[default]
    Sticky,
    /// Alerts disappear once older than the given duration
    ExpireAfter(Duration),
}

impl AlertRetention {
    /// Build from an optional TTL in seconds (`None` or 0 means sticky)
    pub fn from_ttl_secs(ttl: Option<u64>) -> Self {
        match ttl {
            Some(secs) if secs > 0 => AlertRetention::ExpireAfter(Duration::from_secs(secs)),
            _ => AlertRetention::Sticky,
        }
    }

    fn is_expired(&self, raised_at: Instant, now: Instant) -> bool {
        match self {
            AlertRetention::Sticky => false,
            AlertRetention::ExpireAfter(ttl) => now.saturating_duration_since(raised_at) > *ttl,
        }
    }
}

#[derive(Debug, Clone)]
struct AlertEntry {
    message: String,
    raised_at: Instant,
}

/// Concurrency-safe map of alert key to alert message
#[derive(Debug, Default)]
pub struct AlertRegistry {
    alerts: RwLock<HashMap<String, AlertEntry>>,
    retention: AlertRetention,
}

impl AlertRegistry {
    /// Create an empty registry with sticky retention
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with the given retention policy
    pub fn with_retention(retention: AlertRetention) -> Self {
        Self {
            alerts: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> AlertRetention {
        self.retention
    }

    /// Create or replace the alert stored under `key`
    pub fn upsert(&self, key: impl Into<String>, message: impl Into<String>) {
        let entry = AlertEntry {
            message: message.into(),
            raised_at: Instant::now(),
        };
        let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        alerts.insert(key.into(), entry);
    }

    /// Point-in-time copy of all visible alerts
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let now = Instant::now();
        let alerts = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        alerts
            .iter()
            .filter(|(_, entry)| !self.retention.is_expired(entry.raised_at, now))
            .map(|(key, entry)| (key.clone(), entry.message.clone()))
            .collect()
    }

    /// Message stored under `key`, if visible
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let alerts = self.alerts.read().unwrap_or_else(PoisonError::into_inner);
        alerts
            .get(key)
            .filter(|entry| !self.retention.is_expired(entry.raised_at, now))
            .map(|entry| entry.message.clone())
    }

    /// Drop expired alerts, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        if self.retention == AlertRetention::Sticky {
            return 0;
        }

        let now = Instant::now();
        let mut alerts = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        let before = alerts.len();
        alerts.retain(|_, entry| !self.retention.is_expired(entry.raised_at, now));
        before - alerts.len()
    }

    /// Number of stored alerts, expired or not
    pub fn len(&self) -> usize {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
