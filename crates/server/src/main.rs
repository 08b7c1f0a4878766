use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod config;
mod mcp_client;
mod ui;

use config::{AppState, UiConfig};

#[derive(Parser, Debug)]
#[command(name = "b24-ui")]
#[command(about = "Browser tool tester for the Bitrix24 MCP server", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "b24-ui.toml")]
    config: PathBuf,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// MCP endpoint of the tools server
    #[arg(long, env = "MCP_SERVER_URL", default_value = "http://localhost:8000/mcp")]
    mcp_server_url: String,

    /// Bearer token of the MCP server
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    auth_token: String,

    /// Directory for daily log files
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Console plus a daily-rotated file; the guard flushes the file writer on exit
    let file_appender = tracing_appender::rolling::daily(&args.log_dir, "ui.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "b24_ui=info,tower_http=debug".into()),
        )
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    if args.auth_token.trim().is_empty() {
        bail!("AUTH_TOKEN must not be empty");
    }

    tracing::info!("Starting Bitrix24 MCP tool tester");
    tracing::info!("MCP server: {}", args.mcp_server_url);

    let config = UiConfig::load(&args.config)?;
    let state = AppState::new(&config, &args.mcp_server_url, &args.auth_token)?;

    // The MCP server may come up later, so a failed probe is not fatal
    match state.mcp.list_tools().await {
        Ok(tools) => tracing::info!(tools = tools.len(), "MCP server reachable"),
        Err(e) => tracing::warn!(error = %e, url = state.mcp.url(), "MCP server probe failed"),
    }

    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Starting API server on {}", addr);

    api::serve(&addr, state).await?;

    Ok(())
}
