//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// CLI configuration from `~/.config/swctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Monitor API URL
    pub api_url: Option<String>,
    /// Bearer token for share provisioning
    pub access_token: Option<String>,
    /// Resource ID of the storage account's file service
    pub file_service_id: Option<String>,
    /// Management endpoint override
    pub management_endpoint: Option<String>,
}

/// Credentials needed to create or delete shares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    pub file_service_id: String,
    pub management_endpoint: Option<String>,
}

impl Config {
    /// Load configuration from file, if present
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// API URL: flag or env var first, then the config file
    pub fn api_url(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Provisioning credentials from `SHAREWATCH_ACCESS_TOKEN` and
    /// `SHAREWATCH_FILE_SERVICE_ID`, falling back to the config file
    pub fn credentials(&self) -> Result<Credentials> {
        self.resolve_credentials(
            std::env::var("SHAREWATCH_ACCESS_TOKEN").ok(),
            std::env::var("SHAREWATCH_FILE_SERVICE_ID").ok(),
        )
    }

    fn resolve_credentials(
        &self,
        env_token: Option<String>,
        env_service: Option<String>,
    ) -> Result<Credentials> {
        let non_empty = |v: &String| !v.trim().is_empty();
        let token = env_token
            .filter(non_empty)
            .or_else(|| self.access_token.clone().filter(non_empty));
        let service = env_service
            .filter(non_empty)
            .or_else(|| self.file_service_id.clone().filter(non_empty));

        match (token, service) {
            (Some(access_token), Some(file_service_id)) => Ok(Credentials {
                access_token,
                file_service_id,
                management_endpoint: self.management_endpoint.clone(),
            }),
            _ => anyhow::bail!(
                "SHAREWATCH_ACCESS_TOKEN and SHAREWATCH_FILE_SERVICE_ID must be set"
            ),
        }
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("swctl").join("config.json"))
    }
}
