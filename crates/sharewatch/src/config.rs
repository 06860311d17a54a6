//! Monitor configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use sharewatch_lib::anomaly::{AlertRetention, DEFAULT_THRESHOLD, DEFAULT_WINDOW_SIZE};
use sharewatch_lib::models::{parse_share_targets, ShareTarget};
use sharewatch_lib::poller::PollerConfig;
use std::path::Path;
use std::time::Duration;

const MIN_WINDOW_SIZE: usize = 2;

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Monitored shares as `name:fileServiceResourceId` entries
    #[serde(default)]
    pub shares: Vec<String>,

    /// Bearer token for the Azure management plane
    #[serde(default)]
    pub access_token: Option<String>,

    /// Resource ID of the storage account's file service (inventory scope)
    #[serde(default)]
    pub file_service_id: Option<String>,

    /// Azure management endpoint
    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Samples per detector window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Z-score above which a sample is reported as a spike
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Seconds an alert stays visible; unset keeps alerts until overwritten
    #[serde(default)]
    pub alert_ttl_secs: Option<u64>,
}

fn default_management_endpoint() -> String {
    "https://management.azure.com/".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    60
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_anomaly_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            shares: Vec::new(),
            access_token: None,
            file_service_id: None,
            management_endpoint: default_management_endpoint(),
            api_port: default_api_port(),
            poll_interval_secs: default_poll_interval(),
            window_size: default_window_size(),
            anomaly_threshold: default_anomaly_threshold(),
            alert_ttl_secs: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from `SHAREWATCH_*` environment variables and
    /// the optional file named by `SHAREWATCH_CONFIG`
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::var("SHAREWATCH_CONFIG").ok().as_deref())
    }

    /// Load configuration, layering the environment over `file`
    pub fn load_from(file: Option<&str>) -> Result<Self> {
        Self::load_with(file, Self::environment())
    }

    /// `SHAREWATCH_*` variables; `SHAREWATCH_SHARES` is a comma list
    fn environment() -> config::Environment {
        config::Environment::with_prefix("SHAREWATCH")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("shares")
    }

    fn load_with(file: Option<&str>, environment: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(Path::new(path)).required(true));
        }

        let config: Self = builder
            .add_source(environment)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid monitor configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        // Sample standard deviation needs two samples in the window
        if self.window_size < MIN_WINDOW_SIZE {
            anyhow::bail!(
                "window_size must be at least {}, got {}",
                MIN_WINDOW_SIZE,
                self.window_size
            );
        }
        Ok(())
    }

    /// Parsed share targets; malformed and duplicate entries are skipped
    pub fn targets(&self) -> Vec<ShareTarget> {
        parse_share_targets(&self.shares)
    }

    /// Credential for the management plane, if configured and non-empty
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            window_size: self.window_size,
            threshold: self.anomaly_threshold,
        }
    }

    pub fn alert_retention(&self) -> AlertRetention {
        AlertRetention::from_ttl_secs(self.alert_ttl_secs)
    }
}
