//! MCP server exposing the advisory board as tools over stdio.
//!
//! Stdout carries the protocol, so logs go to stderr.

mod tools;

use advisory_client::{ApiClient, ClientConfig};
use anyhow::Context;
use rmcp::{ServiceExt, transport::stdio};
use tools::AdvisoryTools;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!(api_base = %config.api_base, "Starting advisory MCP server");
    let service = AdvisoryTools::new(ApiClient::new(config.api_base))
        .serve(stdio())
        .await
        .context("Failed to start MCP service")?;
    service.waiting().await?;
    info!("MCP client disconnected.");
    Ok(())
}
