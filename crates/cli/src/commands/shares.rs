//! Share inventory and provisioning commands

use anyhow::{Context, Result};
use serde_json::json;
use sharewatch_lib::sources::{AzureClientConfig, AzureFileShares};
use sharewatch_lib::ShareInfo;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::config::Credentials;
use crate::output::{format_metric, print_json, print_rows, print_success, OutputFormat};

/// Row for the share inventory table
#[derive(Tabled)]
struct ShareRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Quota (GiB)")]
    quota: i32,
    #[tabled(rename = "IOPS")]
    iops: String,
    #[tabled(rename = "Bandwidth MiB/s")]
    bandwidth: String,
    #[tabled(rename = "Latency ms")]
    latency: String,
    #[tabled(rename = "Transactions/s")]
    transactions: String,
}

impl From<&ShareInfo> for ShareRow {
    fn from(share: &ShareInfo) -> Self {
        Self {
            name: share.name.clone(),
            quota: share.quota_gb,
            iops: format_metric(share.iops),
            bandwidth: format_metric(share.bandwidth_mib),
            latency: format_metric(share.latency_ms),
            transactions: format_metric(share.transactions),
        }
    }
}

/// List monitored shares
pub async fn list_shares(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let shares: Vec<ShareInfo> = client.get("api/shares").await?;
    let rows: Vec<ShareRow> = shares.iter().map(ShareRow::from).collect();

    print_rows(&rows, &shares, "No shares monitored", format)
}

fn file_shares(credentials: &Credentials) -> Result<AzureFileShares> {
    let mut config = AzureClientConfig::new(credentials.access_token.clone());
    if let Some(endpoint) = &credentials.management_endpoint {
        config = config.with_endpoint(endpoint.clone());
    }
    AzureFileShares::new(&config, credentials.file_service_id.clone())
}

/// Create a share with the given quota
pub async fn create_share(
    credentials: &Credentials,
    name: &str,
    quota_gb: i32,
    format: OutputFormat,
) -> Result<()> {
    file_shares(credentials)?
        .create(name, quota_gb)
        .await
        .context("Failed to create share")?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "name": name,
            "quotaGB": quota_gb,
            "status": "created",
        }))?,
        OutputFormat::Table => {
            print_success(&format!("Share {:?} created (quota: {} GiB)", name, quota_gb))
        }
    }

    Ok(())
}

/// Delete a share
pub async fn delete_share(credentials: &Credentials, name: &str, format: OutputFormat) -> Result<()> {
    file_shares(credentials)?
        .delete(name)
        .await
        .context("Failed to delete share")?;

    match format {
        OutputFormat::Json => print_json(&json!({ "name": name, "status": "deleted" }))?,
        OutputFormat::Table => print_success(&format!("Share {:?} deleted", name)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_row_formatting() {
        let mut share = ShareInfo::new("logs", 100);
        share.set_metric(sharewatch_lib::MetricKind::Iops, 1234.5678);

        let row = ShareRow::from(&share);
        assert_eq!(row.name, "logs");
        assert_eq!(row.quota, 100);
        assert_eq!(row.iops, "1234.57");
        assert_eq!(row.latency, "0.00");
    }

    #[tokio::test]
    async fn test_create_share_uses_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", mockito::Matcher::Regex("/shares/logs$".into()))
            .match_query(mockito::Matcher::Any)
            .match_header("authorization", "Bearer token")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let credentials = Credentials {
            access_token: "token".into(),
            file_service_id: "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/a/fileServices/default".into(),
            management_endpoint: Some(server.url()),
        };

        create_share(&credentials, "logs", 10, OutputFormat::Json)
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
