// MCP server binary exposing Bitrix24 CRM tools

use anyhow::{bail, Result};
use b24_mcp::config::McpConfig;
use b24_mcp::tools::default_registry;
use b24_mcp::transport::{HttpTransport, StdioTransport};
use b24_mcp::McpServer;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    Stdio,
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "b24-mcp")]
#[command(about = "Bitrix24 CRM tools for MCP clients", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "b24-mcp.toml")]
    config: PathBuf,

    /// Transport to serve on
    #[arg(short, long, value_enum, env = "MCP_TRANSPORT", default_value = "stdio")]
    transport: TransportKind,

    /// Host to bind to (http transport)
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (http transport)
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Bitrix24 inbound webhook, e.g. https://portal.bitrix24.ru/rest/1/secret/
    #[arg(long, env = "WEBHOOK")]
    webhook: String,

    /// Bearer token clients must present (http transport)
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Directory for export files
    #[arg(long, env = "EXPORTS_DIR", default_value = "exports")]
    exports_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout belongs to the protocol, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "b24_mcp=info,b24_sdk=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Bitrix24 MCP server starting...");

    let config = McpConfig::load(&args.config)?;
    let client = Arc::new(config.client(&args.webhook)?);

    let registry = default_registry(client, args.exports_dir.clone());
    tracing::info!(
        tools = registry.len(),
        exports_dir = %args.exports_dir.display(),
        "Registered tools"
    );

    let server = Arc::new(McpServer::new(registry));

    match args.transport {
        TransportKind::Stdio => StdioTransport::new(server).serve().await,
        TransportKind::Http => {
            let Some(token) = args.auth_token.filter(|t| !t.trim().is_empty()) else {
                bail!("AUTH_TOKEN is required for the http transport");
            };
            let addr = format!("{}:{}", args.host, args.port);
            HttpTransport::new(addr, token).serve(server).await
        }
    }
}
