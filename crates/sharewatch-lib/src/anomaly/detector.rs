//! Sliding-window spike detection
//!
//! Detects spikes by keeping the most recent `N` samples of one
//! (share, metric) series and flagging values whose z-score against the
//! window exceeds a fixed threshold.

use std::collections::VecDeque;
use thiserror::Error;
use tracing::warn;

/// Default window capacity (20 samples, one per poll)
pub const DEFAULT_WINDOW_SIZE: usize = 20;

/// Default z-score threshold (3 sigma)
///
/// Earlier deployments of this monitor disagreed on the cutoff (3.0 in the
/// detector, 0.5 in an experimental build). 3.0 is kept as the default and
/// the value is operator-tunable through configuration.
///
/// No threshold suppresses spikes on a flat window: its z-score is
/// infinite for any change, so an idle share reading 0 is flagged on its
/// first non-zero sample.
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// Failure to compute window statistics
#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("need at least 2 samples for a standard deviation, have {0}")]
    InsufficientSamples(usize),

    #[error("window contains non-finite values")]
    NonFinite,
}

/// Mean and sample standard deviation of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl WindowStats {
    /// Compute statistics over `samples` using the two-pass algorithm
    /// with Bessel's correction (sample standard deviation)
    pub fn compute<'a, I>(samples: I) -> Result<Self, StatsError>
    where
        I: IntoIterator<Item = &'a f64>,
        I::IntoIter: Clone,
    {
        let iter = samples.into_iter();
        let count = iter.clone().count();

        if count < 2 {
            return Err(StatsError::InsufficientSamples(count));
        }

        let mean = iter.clone().sum::<f64>() / count as f64;
        let variance = iter.map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        let std_dev = variance.sqrt();

        if !mean.is_finite() || !std_dev.is_finite() {
            return Err(StatsError::NonFinite);
        }

        Ok(Self {
            mean,
            std_dev,
            count,
        })
    }

    /// Absolute z-score of `value` against these statistics
    ///
    /// A flat window (zero spread) yields 0 for a value equal to the mean
    /// and infinity for any other value.
    pub fn z_score(&self, value: f64) -> f64 {
        let deviation = (value - self.mean).abs();
        if self.std_dev > 0.0 {
            deviation / self.std_dev
        } else if deviation == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    }
}

/// Details of a detected spike
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeAnomaly {
    /// Observed value that triggered the spike
    pub value: f64,
    /// Window mean before the value was added
    pub expected: f64,
    /// Absolute z-score of the value
    pub z_score: f64,
    /// Window standard deviation before the value was added
    pub std_dev: f64,
    /// Threshold that was exceeded
    pub threshold: f64,
}

/// Windowed z-score detector for one (share, metric) series
#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    window: VecDeque<f64>,
    capacity: usize,
    threshold: f64,
}

impl ZScoreDetector {
    /// Create a detector holding up to `capacity` samples (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Set the z-score threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Add a sample and report whether it is a spike
    pub fn add(&mut self, value: f64) -> bool {
        self.observe(value).is_some()
    }

    /// Add a sample, returning spike details when it exceeds the threshold
    ///
    /// Returns `None` during warm-up (window not yet full), when window
    /// statistics cannot be computed, and for normal samples. Once the
    /// window is full the value always replaces the oldest sample, spike
    /// or not.
    pub fn observe(&mut self, value: f64) -> Option<SpikeAnomaly> {
        if self.window.len() < self.capacity {
            self.window.push_back(value);
            return None;
        }

        let anomaly = match WindowStats::compute(&self.window) {
            Ok(stats) => {
                let z_score = stats.z_score(value);
                (z_score > self.threshold).then(|| SpikeAnomaly {
                    value,
                    expected: stats.mean,
                    z_score,
                    std_dev: stats.std_dev,
                    threshold: self.threshold,
                })
            }
            Err(e) => {
                warn!(error = %e, "Could not compute window statistics");
                None
            }
        };

        self.slide(value);
        anomaly
    }

    fn slide(&mut self, value: f64) {
        self.window.pop_front();
        self.window.push_back(value);
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether the warm-up phase is over
    pub fn is_warm(&self) -> bool {
        self.window.len() >= self.capacity
    }

    /// Samples in the window, oldest first
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
