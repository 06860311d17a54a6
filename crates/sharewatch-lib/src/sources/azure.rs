//! Azure management-plane clients
//!
//! Metrics come from Azure Monitor, the share inventory from the storage
//! resource provider. Both authenticate with a bearer token.

use super::{InventoryError, InventorySource, MetricsError, MetricsSource};
use crate::models::{DimensionFilter, MetricKind, MetricSample, ShareQuota};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Trailing window searched for the latest metric value
pub const METRICS_LOOKBACK: Duration = Duration::from_secs(5 * 60);

const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com/";
const METRICS_API_VERSION: &str = "2023-10-01";
const STORAGE_API_VERSION: &str = "2023-01-01";

/// Connection settings shared by the Azure clients
#[derive(Debug, Clone)]
pub struct AzureClientConfig {
    /// Management endpoint base URL
    pub endpoint: String,
    /// Bearer token for the management plane
    pub access_token: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl AzureClientConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the management endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Authenticated HTTP client rooted at the management endpoint
#[derive(Debug, Clone)]
struct ArmClient {
    client: Client,
    endpoint: Url,
    token: String,
}

impl ArmClient {
    fn new(config: &AzureClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let mut endpoint = config.endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let endpoint = Url::parse(&endpoint).context("Invalid management endpoint")?;

        Ok(Self {
            client,
            endpoint,
            token: config.access_token.clone(),
        })
    }

    /// URL of a resource path such as `/subscriptions/.../shares`
    fn resource_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.endpoint.join(path.trim_start_matches('/'))
    }
}

/// Pass successful responses through, otherwise return status and body
async fn check_status(response: Response) -> Result<Response, (u16, String)> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err((status.as_u16(), body))
}

#[derive(Debug, Deserialize)]
struct MetricsResponse {
    #[serde(default)]
    value: Vec<MetricEntry>,
}

#[derive(Debug, Deserialize)]
struct MetricEntry {
    #[serde(default)]
    timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    data: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataPoint {
    time_stamp: DateTime<Utc>,
    average: Option<f64>,
}

impl MetricsResponse {
    /// Most recent data point that carries an average
    fn latest_sample(&self) -> Option<MetricSample> {
        self.value
            .iter()
            .flat_map(|metric| metric.timeseries.iter())
            .flat_map(|series| series.data.iter())
            .filter_map(|point| {
                point.average.map(|value| MetricSample {
                    value,
                    timestamp: point.time_stamp,
                })
            })
            .max_by_key(|sample| sample.timestamp)
    }
}

/// Azure Monitor metrics client
#[derive(Debug, Clone)]
pub struct AzureMonitorMetrics {
    arm: ArmClient,
}

impl AzureMonitorMetrics {
    pub fn new(config: &AzureClientConfig) -> Result<Self> {
        Ok(Self {
            arm: ArmClient::new(config)?,
        })
    }
}

#[async_trait]
impl MetricsSource for AzureMonitorMetrics {
    async fn get_metric(
        &self,
        resource_id: &str,
        metric: MetricKind,
        filter: &DimensionFilter,
    ) -> Result<MetricSample, MetricsError> {
        let path = format!(
            "{}/providers/Microsoft.Insights/metrics",
            resource_id.trim_end_matches('/')
        );
        let url = self
            .arm
            .resource_url(&path)
            .map_err(|e| MetricsError::InvalidResource(format!("{}: {}", resource_id, e)))?;

        let now = Utc::now();
        let start = now - chrono::Duration::seconds(METRICS_LOOKBACK.as_secs() as i64);
        let timespan = format!(
            "{}/{}",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let odata = filter.to_odata();

        debug!(resource_id = %resource_id, metric = %metric, "Querying metrics");

        let response = self
            .arm
            .client
            .get(url)
            .bearer_auth(&self.arm.token)
            .query(&[
                ("api-version", METRICS_API_VERSION),
                ("timespan", timespan.as_str()),
                ("metricnames", metric.provider_name()),
                ("aggregation", "Average"),
                ("$filter", odata.as_str()),
            ])
            .send()
            .await?;

        let response = check_status(response)
            .await
            .map_err(|(status, body)| MetricsError::Status { status, body })?;

        let payload: MetricsResponse = response.json().await?;
        payload.latest_sample().ok_or_else(|| MetricsError::NoData {
            metric: metric.provider_name().to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ShareListResponse {
    #[serde(default)]
    value: Vec<ShareResource>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShareResource {
    name: String,
    #[serde(default)]
    properties: ShareProperties,
}

#[derive(Debug, Default, Deserialize)]
struct ShareProperties {
    #[serde(rename = "shareQuota")]
    share_quota: Option<i32>,
}

/// File share inventory of one storage account's file service
#[derive(Debug, Clone)]
pub struct AzureFileShares {
    arm: ArmClient,
    file_service_id: String,
}

impl AzureFileShares {
    pub fn new(config: &AzureClientConfig, file_service_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            arm: ArmClient::new(config)?,
            file_service_id: file_service_id.into(),
        })
    }

    fn shares_url(&self, share: Option<&str>) -> Result<Url, InventoryError> {
        let base = self.file_service_id.trim_end_matches('/');
        let mut url = self
            .arm
            .resource_url(base)
            .map_err(|e| InventoryError::InvalidResource(format!("{}: {}", base, e)))?;

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InventoryError::InvalidResource(base.to_string()))?;
            segments.pop_if_empty().push("shares");
            // Share name is a single segment; `/` and `?` are escaped
            if let Some(name) = share {
                segments.push(name);
            }
        }

        url.query_pairs_mut()
            .append_pair("api-version", STORAGE_API_VERSION);
        Ok(url)
    }

    /// Create a share with the given quota in GiB
    pub async fn create(&self, name: &str, quota_gb: i32) -> Result<(), InventoryError> {
        let url = self.shares_url(Some(name))?;
        let response = self
            .arm
            .client
            .put(url)
            .bearer_auth(&self.arm.token)
            .json(&json!({ "properties": { "shareQuota": quota_gb } }))
            .send()
            .await?;

        check_status(response)
            .await
            .map_err(|(status, body)| InventoryError::Status { status, body })?;
        Ok(())
    }

    /// Delete a share
    pub async fn delete(&self, name: &str) -> Result<(), InventoryError> {
        let url = self.shares_url(Some(name))?;
        let response = self
            .arm
            .client
            .delete(url)
            .bearer_auth(&self.arm.token)
            .send()
            .await?;

        check_status(response)
            .await
            .map_err(|(status, body)| InventoryError::Status { status, body })?;
        Ok(())
    }
}

#[async_trait]
impl InventorySource for AzureFileShares {
    async fn list(&self) -> Result<Vec<ShareQuota>, InventoryError> {
        let mut next = Some(self.shares_url(None)?);
        let mut shares = Vec::new();

        while let Some(url) = next.take() {
            let response = self
                .arm
                .client
                .get(url)
                .bearer_auth(&self.arm.token)
                .send()
                .await?;

            let response = check_status(response)
                .await
                .map_err(|(status, body)| InventoryError::Status { status, body })?;

            let page: ShareListResponse = response.json().await?;
            shares.extend(page.value.into_iter().map(|share| ShareQuota {
                name: share.name,
                quota_gb: share.properties.share_quota.unwrap_or(0),
            }));

            next = match page.next_link {
                Some(link) => Some(
                    Url::parse(&link)
                        .map_err(|e| InventoryError::InvalidResource(format!("{}: {}", link, e)))?,
                ),
                None => None,
            };
        }

        debug!(count = shares.len(), "Listed file shares");
        Ok(shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const FILE_SERVICE: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acct/fileServices/default";

    fn config_for(server: &mockito::Server) -> AzureClientConfig {
        AzureClientConfig::new("test-token").with_endpoint(server.url())
    }

    #[test]
    fn test_latest_sample_picks_newest_average() {
        let payload: MetricsResponse = serde_json::from_value(serde_json::json!({
            "value": [{
                "timeseries": [{
                    "data": [
                        { "timeStamp": "2024-05-01T10:00:00Z", "average": 10.0 },
                        { "timeStamp": "2024-05-01T10:02:00Z", "average": 30.0 },
                        { "timeStamp": "2024-05-01T10:03:00Z" }
                    ]
                }]
            }]
        }))
        .unwrap();

        let sample = payload.latest_sample().unwrap();
        assert_eq!(sample.value, 30.0);
        assert_eq!(sample.timestamp.to_rfc3339(), "2024-05-01T10:02:00+00:00");
    }

    #[tokio::test]
    async fn test_get_metric_queries_monitor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/subscriptions/sub/.+/providers/Microsoft\.Insights/metrics$".into()))
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("metricnames".into(), "FileShareMaxUsedIOPS".into()),
                Matcher::UrlEncoded("aggregation".into(), "Average".into()),
                Matcher::UrlEncoded("$filter".into(), "FileShare eq 'logs'".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"value":[{"timeseries":[{"data":[{"timeStamp":"2024-05-01T10:00:00Z","average":42.5}]}]}]}"#,
            )
            .create_async()
            .await;

        let source = AzureMonitorMetrics::new(&config_for(&server)).unwrap();
        let sample = source
            .get_metric(FILE_SERVICE, MetricKind::Iops, &DimensionFilter::share("logs"))
            .await
            .unwrap();

        assert_eq!(sample.value, 42.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_metric_no_data() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("metrics".into()))
            .with_body(r#"{"value":[{"timeseries":[]}]}"#)
            .create_async()
            .await;

        let source = AzureMonitorMetrics::new(&config_for(&server)).unwrap();
        let result = source
            .get_metric(FILE_SERVICE, MetricKind::Latency, &DimensionFilter::share("logs"))
            .await;

        assert!(matches!(result, Err(MetricsError::NoData { .. })));
    }

    #[tokio::test]
    async fn test_get_metric_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("metrics".into()))
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let source = AzureMonitorMetrics::new(&config_for(&server)).unwrap();
        let result = source
            .get_metric(FILE_SERVICE, MetricKind::Iops, &DimensionFilter::share("logs"))
            .await;

        match result {
            Err(MetricsError::Status { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let mut server = mockito::Server::new_async().await;
        let next_link = format!(
            "{}{}/shares?api-version={}&$skipToken=page2",
            server.url(),
            FILE_SERVICE,
            STORAGE_API_VERSION
        );

        let first = server
            .mock("GET", Matcher::Regex(r"/fileServices/default/shares$".into()))
            .match_query(Matcher::Exact(format!("api-version={}", STORAGE_API_VERSION)))
            .with_body(
                serde_json::json!({
                    "value": [{ "name": "logs", "properties": { "shareQuota": 100 } }],
                    "nextLink": next_link
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", Matcher::Regex(r"/fileServices/default/shares$".into()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api-version".into(), STORAGE_API_VERSION.into()),
                Matcher::UrlEncoded("$skipToken".into(), "page2".into()),
            ]))
            .with_body(r#"{"value":[{"name":"media","properties":{}}]}"#)
            .create_async()
            .await;

        let inventory = AzureFileShares::new(&config_for(&server), FILE_SERVICE).unwrap();
        let shares = inventory.list().await.unwrap();

        assert_eq!(
            shares,
            vec![
                ShareQuota { name: "logs".into(), quota_gb: 100 },
                ShareQuota { name: "media".into(), quota_gb: 0 },
            ]
        );
        second.assert_async().await;
        first.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Any)
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let inventory = AzureFileShares::new(&config_for(&server), FILE_SERVICE).unwrap();
        let result = inventory.list().await;
        assert!(matches!(result, Err(InventoryError::Status { status: 401, .. })));
    }

    #[test]
    fn test_share_name_is_one_path_segment() {
        let config = AzureClientConfig::new("test-token").with_endpoint("https://arm.example/");
        let inventory = AzureFileShares::new(&config, format!("{}/", FILE_SERVICE)).unwrap();

        let url = inventory.shares_url(None).unwrap();
        assert_eq!(url.path(), format!("{}/shares", FILE_SERVICE));
        assert_eq!(url.query(), Some("api-version=2023-01-01"));

        let url = inventory.shares_url(Some("team/logs?x")).unwrap();
        assert_eq!(url.path(), format!("{}/shares/team%2Flogs%3Fx", FILE_SERVICE));
        assert_eq!(url.query(), Some("api-version=2023-01-01"));
    }

    #[tokio::test]
    async fn test_create_and_delete_share() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("PUT", Matcher::Regex(r"/shares/backups$".into()))
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(serde_json::json!({ "properties": { "shareQuota": 50 } })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", Matcher::Regex(r"/shares/backups$".into()))
            .match_query(Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let inventory = AzureFileShares::new(&config_for(&server), FILE_SERVICE).unwrap();
        inventory.create("backups", 50).await.unwrap();
        inventory.delete("backups").await.unwrap();

        create.assert_async().await;
        delete.assert_async().await;
    }
}
