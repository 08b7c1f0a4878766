use crate::mcp_client::McpClient;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Upper bound for one MCP round trip; risk reports over many deals are slow
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl UiConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if !config_path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read configuration file")?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub mcp: Arc<McpClient>,
}

impl AppState {
    pub fn new(config: &UiConfig, mcp_server_url: &str, auth_token: &str) -> Result<Self> {
        let mcp = McpClient::new(mcp_server_url, auth_token, config.request_timeout())
            .context("Failed to create MCP client")?;
        Ok(Self { mcp: Arc::new(mcp) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = UiConfig::load(Path::new("/nonexistent/b24-ui.toml")).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_rejects_malformed_file() {
        let path = std::env::temp_dir().join(format!("b24-ui-{}.toml", std::process::id()));
        std::fs::write(&path, "request_timeout_secs = \"soon\"").unwrap();
        let result = UiConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
