//! Observability infrastructure for the share monitor
//!
//! Provides:
//! - Prometheus metrics (poll cycle latency, fetch errors, anomalies, active alerts)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for poll cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<Option<MonitorMetricsInner>> = OnceLock::new();

struct MonitorMetricsInner {
    poll_cycle_seconds: Histogram,
    metric_fetch_errors: IntCounter,
    anomalies_detected: IntCounter,
    shares_monitored: IntGauge,
    active_alerts: IntGauge,
}

impl MonitorMetricsInner {
    fn register() -> Result<Self, prometheus::Error> {
        Ok(Self {
            poll_cycle_seconds: register_histogram!(
                "sharewatch_poll_cycle_seconds",
                "Time spent fetching and evaluating every share metric in one poll cycle",
                CYCLE_BUCKETS.to_vec()
            )?,
            metric_fetch_errors: register_int_counter!(
                "sharewatch_metric_fetch_errors_total",
                "Total number of failed metric fetches"
            )?,
            anomalies_detected: register_int_counter!(
                "sharewatch_anomalies_detected_total",
                "Total number of anomalies detected"
            )?,
            shares_monitored: register_int_gauge!(
                "sharewatch_shares_monitored",
                "Number of shares the poller is monitoring"
            )?,
            active_alerts: register_int_gauge!(
                "sharewatch_active_alerts",
                "Number of alerts currently held in the registry"
            )?,
        })
    }
}

/// Monitor metrics for Prometheus exposition
///
/// Lightweight handle to the process-wide metrics; clones share the same
/// underlying collectors. If registration fails every recording call is a
/// no-op.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a metrics handle (registers the collectors on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match MonitorMetricsInner::register() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register Prometheus metrics");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&MonitorMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    /// Record the duration of one poll cycle
    pub fn observe_poll_cycle(&self, duration_secs: f64) {
        if let Some(inner) = self.inner() {
            inner.poll_cycle_seconds.observe(duration_secs);
        }
    }

    pub fn inc_fetch_errors(&self) {
        if let Some(inner) = self.inner() {
            inner.metric_fetch_errors.inc();
        }
    }

    pub fn inc_anomalies_detected(&self) {
        if let Some(inner) = self.inner() {
            inner.anomalies_detected.inc();
        }
    }

    pub fn set_shares_monitored(&self, count: i64) {
        if let Some(inner) = self.inner() {
            inner.shares_monitored.set(count);
        }
    }

    pub fn set_active_alerts(&self, count: i64) {
        if let Some(inner) = self.inner() {
            inner.active_alerts.set(count);
        }
    }
}

/// Render every registered metric in the Prometheus text format
pub fn encode_metrics() -> Result<Vec<u8>, prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(buffer)
}

/// Structured logger for monitor events
///
/// Emits lifecycle and anomaly events with a stable `event` field.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, shares: usize) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            shares = shares,
            "Share monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Share monitor shutting down"
        );
    }

    /// Log an anomaly detection
    pub fn log_anomaly(&self, key: &str, value: f64, expected: f64, z_score: f64, message: &str) {
        warn!(
            event = "anomaly_detected",
            instance = %self.instance,
            key = %key,
            value = value,
            expected = expected,
            z_score = z_score,
            "{}",
            message
        );
    }

    /// Log a failed metric fetch
    pub fn log_fetch_failure(&self, share: &str, metric: &str, error: &str) {
        warn!(
            event = "metric_fetch_failed",
            instance = %self.instance,
            share = %share,
            metric = %metric,
            error = %error,
            "Metric fetch failed"
        );
    }

    /// Log the poller leaving its loop
    pub fn log_poller_exit(&self, reason: &str) {
        info!(
            event = "poller_exited",
            instance = %self.instance,
            reason = %reason,
            "Poller stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_recording() {
        let metrics = MonitorMetrics::new();
        metrics.observe_poll_cycle(0.2);
        metrics.inc_fetch_errors();
        metrics.inc_anomalies_detected();
        metrics.set_shares_monitored(3);
        metrics.set_active_alerts(1);

        // A second handle shares the registered collectors
        let again = MonitorMetrics::new();
        again.inc_anomalies_detected();

        let text = String::from_utf8(encode_metrics().unwrap()).unwrap();
        assert!(text.contains("sharewatch_poll_cycle_seconds_bucket"));
        assert!(text.contains("sharewatch_anomalies_detected_total"));
        assert!(text.contains("sharewatch_shares_monitored"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
    }
}
