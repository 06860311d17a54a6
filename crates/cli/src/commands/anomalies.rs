//! Anomaly alert commands

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{print_rows, split_alert_key, OutputFormat};

/// Row for the active alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Share")]
    share: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Alert")]
    message: String,
}

fn alert_rows(alerts: &BTreeMap<String, String>) -> Vec<AlertRow> {
    alerts
        .iter()
        .map(|(key, message)| {
            let (share, metric) = split_alert_key(key);
            AlertRow {
                share: share.to_string(),
                metric: metric.to_string(),
                message: message.red().to_string(),
            }
        })
        .collect()
}

/// Show the monitor's active anomaly alerts
pub async fn show_anomalies(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let alerts: BTreeMap<String, String> = client.get("api/anomalies").await?;
    let rows = alert_rows(&alerts);

    print_rows(&rows, &alerts, "No active anomalies", format)
}
