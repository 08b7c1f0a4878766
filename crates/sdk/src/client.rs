//! Main client for the Bitrix24 REST API.

use crate::api::*;
use crate::config::{normalize_webhook, ClientConfig, RetryConfig};
use crate::error::{BitrixError, BitrixResult};
use crate::transport::HttpTransport;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Main client for calling Bitrix24 through an incoming webhook.
#[derive(Debug, Clone)]
pub struct BitrixClient {
    config: Arc<ClientConfig>,
    pub(crate) http: HttpTransport,
}

impl BitrixClient {
    /// Create a new client builder.
    pub fn builder() -> BitrixClientBuilder {
        BitrixClientBuilder::new()
    }

    /// Create a client from configuration.
    pub fn from_config(config: ClientConfig) -> BitrixResult<Self> {
        let config = Arc::new(config);
        let http = HttpTransport::new(config.clone())?;

        Ok(Self { config, http })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Call an arbitrary REST method and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> BitrixResult<Value> {
        self.http.call(method, &params).await
    }

    /// Call an arbitrary list method and collect every page.
    pub async fn list_all(&self, method: &str, params: Value) -> BitrixResult<Vec<Value>> {
        self.http.list_all(method, &params).await
    }

    /// Get the CRM items API for one entity kind.
    pub fn crm(&self, kind: EntityKind) -> CrmApi<'_> {
        CrmApi::new(self, kind)
    }

    /// Get the statuses and funnels API.
    pub fn statuses(&self) -> StatusesApi<'_> {
        StatusesApi::new(self)
    }

    /// Get the stage history API.
    pub fn stage_history(&self) -> StageHistoryApi<'_> {
        StageHistoryApi::new(self)
    }

    /// Get the activities and timeline API.
    pub fn activities(&self) -> ActivitiesApi<'_> {
        ActivitiesApi::new(self)
    }

    /// Get the tasks API.
    pub fn tasks(&self) -> TasksApi<'_> {
        TasksApi::new(self)
    }
}

/// Builder for creating a BitrixClient.
pub struct BitrixClientBuilder {
    webhook_url: Option<String>,
    timeout: Duration,
    retry_config: RetryConfig,
    page_limit: usize,
}

impl BitrixClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
            page_limit: 0,
        }
    }

    /// Set the incoming webhook URL.
    pub fn webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Limit the number of pages read by list calls (0 = unlimited).
    pub fn page_limit(mut self, pages: usize) -> Self {
        self.page_limit = pages;
        self
    }

    /// Build the client.
    pub fn build(self) -> BitrixResult<BitrixClient> {
        let webhook = self
            .webhook_url
            .filter(|w| !w.trim().is_empty())
            .ok_or_else(|| BitrixError::Config("webhook_url is required".to_string()))?;

        let webhook_url = Url::parse(webhook.trim())?;
        if !matches!(webhook_url.scheme(), "http" | "https") {
            return Err(BitrixError::Config(format!(
                "webhook must be an http(s) URL, got scheme {}",
                webhook_url.scheme()
            )));
        }

        let config = ClientConfig {
            webhook_url: normalize_webhook(webhook_url),
            timeout: self.timeout,
            retry_config: self.retry_config,
            page_limit: self.page_limit,
        };

        BitrixClient::from_config(config)
    }
}

impl Default for BitrixClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_webhook() {
        let result = BitrixClient::builder().build();
        assert!(matches!(result, Err(BitrixError::Config(_))));

        let result = BitrixClient::builder().webhook_url("  ").build();
        assert!(matches!(result, Err(BitrixError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_bad_url() {
        let result = BitrixClient::builder().webhook_url("not a url").build();
        assert!(matches!(result, Err(BitrixError::InvalidUrl(_))));

        let result = BitrixClient::builder().webhook_url("ftp://example.com/rest/").build();
        assert!(matches!(result, Err(BitrixError::Config(_))));
    }

    #[test]
    fn test_builder_applies_settings() {
        let client = BitrixClient::builder()
            .webhook_url("https://portal.bitrix24.ru/rest/1/abc")
            .timeout(Duration::from_secs(5))
            .retry_config(RetryConfig::no_retry())
            .page_limit(4)
            .build()
            .unwrap();

        let config = client.config();
        assert_eq!(config.webhook_url.as_str(), "https://portal.bitrix24.ru/rest/1/abc/");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry_config.max_retries, 0);
        assert_eq!(config.page_limit, 4);
    }
}
