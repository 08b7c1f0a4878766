// MCP server configuration loaded from an optional TOML file

use anyhow::{Context, Result};
use b24_sdk::{BitrixClient, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub bitrix: BitrixSettings,
}

/// REST client tuning, the webhook itself comes from the command line or env
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitrixSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum pages fetched per list call, 0 means unlimited
    #[serde(default)]
    pub page_limit: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for BitrixSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            page_limit: 0,
        }
    }
}

impl McpConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(path = %config_path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read configuration file {}", config_path.display()))?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }

    /// Build the REST client for the given inbound webhook
    pub fn client(&self, webhook: &str) -> Result<BitrixClient> {
        let retry = RetryConfig {
            max_retries: self.bitrix.max_retries,
            ..RetryConfig::default()
        };

        BitrixClient::builder()
            .webhook_url(webhook)
            .timeout(Duration::from_secs(self.bitrix.timeout_secs))
            .retry_config(retry)
            .page_limit(self.bitrix.page_limit)
            .build()
            .context("Invalid Bitrix24 webhook")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = McpConfig::load(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.bitrix.timeout_secs, 30);
        assert_eq!(config.bitrix.max_retries, 3);
        assert_eq!(config.bitrix.page_limit, 0);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b24-mcp.toml");
        std::fs::write(&path, "[bitrix]\npage_limit = 5\n").unwrap();

        let config = McpConfig::load(&path).unwrap();
        assert_eq!(config.bitrix.page_limit, 5);
        assert_eq!(config.bitrix.timeout_secs, 30);
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b24-mcp.toml");
        std::fs::write(&path, "[bitrix\n").unwrap();

        assert!(McpConfig::load(&path).is_err());
    }

    #[test]
    fn test_client_rejects_bad_webhook() {
        let config = McpConfig::default();
        assert!(config.client("").is_err());
        assert!(config.client("https://example.bitrix24.ru/rest/1/abc/").is_ok());
    }
}
