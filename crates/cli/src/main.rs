//! File share monitor CLI
//!
//! A command-line tool for listing monitored shares, viewing active
//! anomaly alerts and provisioning shares.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{anomalies, shares};

/// File share monitor CLI
#[derive(Parser)]
#[command(name = "swctl")]
#[command(author, version, about = "CLI for the sharewatch file share monitor", long_about = None)]
pub struct Cli {
    /// Monitor API URL (can also be set via SHAREWATCH_API_URL env var)
    #[arg(long, env = "SHAREWATCH_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and provision file shares
    #[command(subcommand)]
    Shares(SharesCommands),

    /// Show active anomaly alerts
    Anomalies,
}

#[derive(Subcommand)]
pub enum SharesCommands {
    /// List monitored shares with their latest metrics
    List,

    /// Create a file share
    Create {
        /// Share name
        name: String,

        /// Quota in GiB
        #[arg(value_parser = clap::value_parser!(i32).range(1..))]
        quota_gb: i32,
    },

    /// Delete a file share
    Delete {
        /// Share name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    match cli.command {
        Commands::Shares(shares_cmd) => match shares_cmd {
            SharesCommands::List => {
                let client = client::ApiClient::new(&config.api_url(cli.api_url.as_deref()))?;
                shares::list_shares(&client, cli.format).await?;
            }
            SharesCommands::Create { name, quota_gb } => {
                let credentials = config.credentials()?;
                shares::create_share(&credentials, &name, quota_gb, cli.format).await?;
            }
            SharesCommands::Delete { name } => {
                let credentials = config.credentials()?;
                shares::delete_share(&credentials, &name, cli.format).await?;
            }
        },
        Commands::Anomalies => {
            let client = client::ApiClient::new(&config.api_url(cli.api_url.as_deref()))?;
            anomalies::show_anomalies(&client, cli.format).await?;
        }
    }

    Ok(())
}
