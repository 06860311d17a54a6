//! Metric polling loop
//!
//! Once per interval, fetches the latest value of every (share, metric)
//! pair, feeds it to that pair's detector and records spikes in the
//! alert registry.

use crate::anomaly::{AlertRegistry, ZScoreDetector, DEFAULT_THRESHOLD, DEFAULT_WINDOW_SIZE};
use crate::health::{components, HealthRegistry};
use crate::models::{AlertKey, DimensionFilter, MetricKind, ShareTarget};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sources::MetricsSource;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between poll cycles (default: 60 seconds)
    pub interval: Duration,
    /// Samples per detector window (default: 20)
    pub window_size: usize,
    /// Z-score above which a sample is a spike (default: 3.0)
    pub threshold: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window_size: DEFAULT_WINDOW_SIZE,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Alert text for a spike on one share metric
pub fn alert_message(share: &str, metric: MetricKind, value: f64) -> String {
    format!("{} spike ({}): {:.2}", share, metric.label(), value)
}

/// Outcome of one poll cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleResults {
    pub fetched: usize,
    pub failed: usize,
    pub anomalies: usize,
}

/// Polling loop owning one detector per (share, metric) pair
pub struct Poller {
    metrics: Arc<dyn MetricsSource>,
    registry: Arc<AlertRegistry>,
    targets: Vec<ShareTarget>,
    config: PollerConfig,
    detectors: HashMap<AlertKey, ZScoreDetector>,
    health: Option<HealthRegistry>,
    monitor_metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl Poller {
    /// Create a poller; duplicate share names are skipped
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        registry: Arc<AlertRegistry>,
        targets: Vec<ShareTarget>,
        config: PollerConfig,
    ) -> Self {
        let mut seen = HashSet::new();
        let targets: Vec<ShareTarget> = targets
            .into_iter()
            .filter(|t| {
                let fresh = seen.insert(t.name.clone());
                if !fresh {
                    warn!(share = %t.name, "Skipping duplicate share target");
                }
                fresh
            })
            .collect();

        let detectors = targets
            .iter()
            .flat_map(|t| MetricKind::ALL.into_iter().map(move |kind| AlertKey::new(&t.name, kind)))
            .map(|key| {
                let detector =
                    ZScoreDetector::new(config.window_size).with_threshold(config.threshold);
                (key, detector)
            })
            .collect();

        Self {
            metrics,
            registry,
            targets,
            config,
            detectors,
            health: None,
            monitor_metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("sharewatch"),
        }
    }

    /// Report poller and metrics-source health into `health`
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn targets(&self) -> &[ShareTarget] {
        &self.targets
    }

    /// Detector for a (share, metric) pair
    pub fn detector(&self, key: &AlertKey) -> Option<&ZScoreDetector> {
        self.detectors.get(key)
    }

    /// Run until `shutdown` fires or its sender is dropped
    ///
    /// Returns immediately when there are no targets.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if self.targets.is_empty() {
            warn!("No valid shares to monitor; poller not started");
            if let Some(health) = &self.health {
                health
                    .set_degraded(components::POLLER, "No shares configured")
                    .await;
            }
            self.logger.log_poller_exit("no shares configured");
            return;
        }

        info!(
            shares = self.targets.len(),
            interval_secs = self.config.interval.as_secs(),
            window = self.config.window_size,
            threshold = self.config.threshold,
            "Starting share metrics poller"
        );
        self.monitor_metrics
            .set_shares_monitored(self.targets.len() as i64);

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let results = self.poll_cycle().await;
                    let elapsed = start.elapsed();

                    self.monitor_metrics.observe_poll_cycle(elapsed.as_secs_f64());
                    debug!(
                        fetched = results.fetched,
                        failed = results.failed,
                        anomalies = results.anomalies,
                        elapsed_ms = elapsed.as_millis(),
                        "Poll cycle complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down share metrics poller");
                    break;
                }
            }
        }

        self.logger.log_poller_exit("shutdown requested");
    }

    /// Fetch and evaluate every (share, metric) pair once
    ///
    /// Fetch failures are logged and skipped; they never abort the cycle.
    pub async fn poll_cycle(&mut self) -> CycleResults {
        let mut results = CycleResults::default();

        let purged = self.registry.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired alerts");
        }

        for target in &self.targets {
            let filter = DimensionFilter::share(&target.name);

            for kind in MetricKind::ALL {
                let sample = match self
                    .metrics
                    .get_metric(&target.resource_id, kind, &filter)
                    .await
                {
                    Ok(sample) => sample,
                    Err(e) => {
                        results.failed += 1;
                        self.monitor_metrics.inc_fetch_errors();
                        self.logger.log_fetch_failure(
                            &target.name,
                            kind.provider_name(),
                            &e.to_string(),
                        );
                        continue;
                    }
                };
                results.fetched += 1;

                let key = AlertKey::new(&target.name, kind);
                let config = &self.config;
                let detector = self.detectors.entry(key.clone()).or_insert_with(|| {
                    ZScoreDetector::new(config.window_size).with_threshold(config.threshold)
                });

                if let Some(spike) = detector.observe(sample.value) {
                    results.anomalies += 1;
                    let message = alert_message(&target.name, kind, spike.value);
                    let key = key.to_string();

                    self.logger
                        .log_anomaly(&key, spike.value, spike.expected, spike.z_score, &message);
                    self.monitor_metrics.inc_anomalies_detected();
                    self.registry.upsert(key, message);
                }
            }
        }

        self.monitor_metrics
            .set_active_alerts(self.registry.len() as i64);
        self.report_health(&results).await;

        results
    }

    async fn report_health(&self, results: &CycleResults) {
        let Some(health) = &self.health else {
            return;
        };

        if results.fetched == 0 && results.failed > 0 {
            health
                .set_degraded(
                    components::METRICS_SOURCE,
                    format!("All {} metric fetches failed", results.failed),
                )
                .await;
        } else if results.fetched > 0 {
            health.set_healthy(components::METRICS_SOURCE).await;
        }
    }
}

/// Builder for creating the poller
pub struct PollerBuilder {
    metrics: Option<Arc<dyn MetricsSource>>,
    registry: Option<Arc<AlertRegistry>>,
    targets: Vec<ShareTarget>,
    config: PollerConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl PollerBuilder {
    pub fn new() -> Self {
        Self {
            metrics: None,
            registry: None,
            targets: Vec::new(),
            config: PollerConfig::default(),
            health: None,
            logger: None,
        }
    }

    pub fn metrics_source(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(mut self, registry: Arc<AlertRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn targets(mut self, targets: Vec<ShareTarget>) -> Self {
        self.targets = targets;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn window_size(mut self, size: usize) -> Self {
        self.config.window_size = size;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<Poller> {
        let metrics = self
            .metrics
            .ok_or_else(|| anyhow::anyhow!("Metrics source is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Alert registry is required"))?;

        let mut poller = Poller::new(metrics, registry, self.targets, self.config);
        if let Some(health) = self.health {
            poller = poller.with_health(health);
        }
        if let Some(logger) = self.logger {
            poller = poller.with_logger(logger);
        }
        Ok(poller)
    }
}

impl Default for PollerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::models::MetricSample;
    use crate::sources::{async_trait, MetricsError};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Metrics source replaying scripted values per (share, metric)
    #[derive(Default)]
    struct ScriptedMetrics {
        values: Mutex<HashMap<(String, MetricKind), VecDeque<f64>>>,
        calls: AtomicUsize,
    }

    impl ScriptedMetrics {
        fn script(self, share: &str, metric: MetricKind, values: &[f64]) -> Self {
            self.values
                .lock()
                .unwrap()
                .insert((share.to_string(), metric), values.iter().copied().collect());
            self
        }
    }

    #[async_trait]
    impl MetricsSource for ScriptedMetrics {
        async fn get_metric(
            &self,
            _resource_id: &str,
            metric: MetricKind,
            filter: &DimensionFilter,
        ) -> Result<MetricSample, MetricsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut values = self.values.lock().unwrap();
            values
                .get_mut(&(filter.share_name.clone(), metric))
                .and_then(|queue| queue.pop_front())
                .map(|value| MetricSample {
                    value,
                    timestamp: chrono::Utc::now(),
                })
                .ok_or_else(|| MetricsError::NoData {
                    metric: metric.provider_name().to_string(),
                })
        }
    }

    fn targets(names: &[&str]) -> Vec<ShareTarget> {
        names
            .iter()
            .map(|n| ShareTarget::new(*n, format!("/fileServices/{}", n)))
            .collect()
    }

    fn poller_with(
        source: ScriptedMetrics,
        names: &[&str],
        window: usize,
    ) -> (Poller, Arc<AlertRegistry>) {
        let registry = Arc::new(AlertRegistry::new());
        let poller = PollerBuilder::new()
            .metrics_source(Arc::new(source))
            .registry(registry.clone())
            .targets(targets(names))
            .window_size(window)
            .threshold(3.0)
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();
        (poller, registry)
    }

    #[test]
    fn test_poller_config_default() {
        let config = PollerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.window_size, 20);
        assert_eq!(config.threshold, 3.0);
    }

    #[test]
    fn test_alert_message_format() {
        assert_eq!(
            alert_message("logs", MetricKind::Bandwidth, 12.345),
            "logs spike (Bandwidth MiB/s): 12.35"
        );
    }

    #[test]
    fn test_builder_requires_metrics_source() {
        let result = PollerBuilder::new()
            .registry(Arc::new(AlertRegistry::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_one_detector_per_pair() {
        let (poller, _) = poller_with(ScriptedMetrics::default(), &["a", "b", "a"], 5);

        assert_eq!(poller.targets().len(), 2);
        for share in ["a", "b"] {
            for kind in MetricKind::ALL {
                assert!(poller.detector(&AlertKey::new(share, kind)).is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_failures_do_not_abort_cycle() {
        let source = ScriptedMetrics::default()
            .script("logs", MetricKind::Latency, &[4.0])
            .script("media", MetricKind::Iops, &[100.0]);
        let (mut poller, registry) = poller_with(source, &["logs", "media"], 3);

        let results = poller.poll_cycle().await;

        assert_eq!(results.fetched, 2);
        assert_eq!(results.failed, 6);
        assert_eq!(results.anomalies, 0);
        assert!(registry.is_empty());
        assert_eq!(
            poller
                .detector(&AlertKey::new("media", MetricKind::Iops))
                .map(|d| d.len()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_spike_raises_alert() {
        let source =
            ScriptedMetrics::default().script("logs", MetricKind::Iops, &[10.0, 10.0, 10.0, 10.0, 1000.0]);
        let (mut poller, registry) = poller_with(source, &["logs"], 3);

        for _ in 0..4 {
            assert_eq!(poller.poll_cycle().await.anomalies, 0);
        }
        assert!(registry.is_empty());

        let results = poller.poll_cycle().await;
        assert_eq!(results.anomalies, 1);
        assert_eq!(
            registry.snapshot().get("logs-FileShareMaxUsedIOPS").map(String::as_str),
            Some("logs spike (IOPS): 1000.00")
        );
    }

    #[tokio::test]
    async fn test_detectors_are_not_shared_between_shares() {
        // A shared window would flag the jump from "quiet" to "busy"
        let source = ScriptedMetrics::default()
            .script("quiet", MetricKind::Iops, &[10.0, 10.0, 10.0, 10.0])
            .script("busy", MetricKind::Iops, &[5000.0, 5000.0, 5000.0, 5000.0]);
        let (mut poller, registry) = poller_with(source, &["quiet", "busy"], 3);

        for _ in 0..4 {
            poller.poll_cycle().await;
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_alert_is_sticky_after_spike_subsides() {
        let source = ScriptedMetrics::default().script(
            "logs",
            MetricKind::Transactions,
            &[1.0, 2.0, 1.0, 2.0, 900.0, 1.0],
        );
        let (mut poller, registry) = poller_with(source, &["logs"], 4);

        for _ in 0..6 {
            poller.poll_cycle().await;
        }
        assert!(registry.get("logs-Transactions").is_some());
    }

    #[tokio::test]
    async fn test_all_fetches_failing_degrades_health() {
        let health = HealthRegistry::new();
        health.register(components::METRICS_SOURCE).await;
        let (poller, _) = poller_with(ScriptedMetrics::default(), &["logs"], 3);
        let mut poller = poller.with_health(health.clone());

        poller.poll_cycle().await;

        assert_eq!(
            health.status_of(components::METRICS_SOURCE).await,
            Some(ComponentStatus::Degraded)
        );
    }

    #[tokio::test]
    async fn test_run_exits_without_targets() {
        let health = HealthRegistry::new();
        let (poller, _) = poller_with(ScriptedMetrics::default(), &[], 3);
        let poller = poller.with_health(health.clone());
        let (_tx, rx) = broadcast::channel(1);

        tokio::time::timeout(Duration::from_secs(1), poller.run(rx))
            .await
            .expect("poller should return immediately");

        assert_eq!(
            health.status_of(components::POLLER).await,
            Some(ComponentStatus::Degraded)
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let source = Arc::new(ScriptedMetrics::default());
        let registry = Arc::new(AlertRegistry::new());
        let poller = PollerBuilder::new()
            .metrics_source(source.clone())
            .registry(registry)
            .targets(targets(&["logs"]))
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(poller.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller should stop")
            .unwrap();
        assert!(source.calls.load(Ordering::SeqCst) >= MetricKind::ALL.len());
    }
}
