//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a table, or `raw` as pretty JSON
pub fn print_rows<T: Tabled, R: Serialize + ?Sized>(
    rows: &[T],
    raw: &R,
    empty: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", empty.yellow());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
        OutputFormat::Json => print_json(raw)?,
    }
    Ok(())
}

pub fn print_json<R: Serialize + ?Sized>(value: &R) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Format a metric value with two decimals
pub fn format_metric(value: f64) -> String {
    format!("{:.2}", value)
}

/// Split an alert key into share and provider metric name
///
/// Metric names never contain `-`, so the split is on the last one.
pub fn split_alert_key(key: &str) -> (&str, &str) {
    key.rsplit_once('-').unwrap_or((key, ""))
}
