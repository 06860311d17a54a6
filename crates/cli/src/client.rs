//! API client for communicating with the monitor

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

/// API client for the monitor's HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body.trim());
        }

        response.json().await.context("Failed to parse response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_get_decodes_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/anomalies")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"logs-Transactions":"logs spike (Transactions/s): 9000.00"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let alerts: BTreeMap<String, String> = client.get("api/anomalies").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            alerts.get("logs-Transactions").map(String::as_str),
            Some("logs spike (Transactions/s): 9000.00")
        );
    }

    #[tokio::test]
    async fn test_get_surfaces_server_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/shares")
            .with_status(500)
            .with_body("inventory unavailable\n")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .get::<serde_json::Value>("api/shares")
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("inventory unavailable"));
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
