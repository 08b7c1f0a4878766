//! Configuration types for the Bitrix24 client.

use std::time::Duration;
use url::Url;

/// Configuration for the Bitrix24 client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Incoming webhook URL, e.g. `https://portal.bitrix24.ru/rest/1/secret/`.
    pub webhook_url: Url,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry configuration.
    pub retry_config: RetryConfig,
    /// Maximum number of pages fetched by list calls (0 = unlimited).
    pub page_limit: usize,
}

impl ClientConfig {
    /// Create a new configuration for the given webhook URL.
    pub fn new(webhook_url: Url) -> Self {
        Self {
            webhook_url: normalize_webhook(webhook_url),
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::default(),
            page_limit: 0,
        }
    }
}

/// Method names are joined onto the webhook URL, so it must end with `/`.
pub(crate) fn normalize_webhook(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// HTTP status codes to retry on.
    pub retry_on_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            // Bitrix24 allows ~2 requests per second per webhook
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            retry_on_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// Create a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        std::cmp::min(backoff, self.max_backoff)
    }

    /// Check if a status code should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status_codes.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let config = RetryConfig {
            max_backoff: Duration::from_millis(500),
            ..Default::default()
        };

        assert_eq!(config.backoff_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn test_should_retry_status() {
        let config = RetryConfig::default();

        assert!(config.should_retry_status(429));
        assert!(config.should_retry_status(503));
        assert!(!config.should_retry_status(400));
        assert!(!config.should_retry_status(401));
    }

    #[test]
    fn test_webhook_gets_trailing_slash() {
        let config = ClientConfig::new(Url::parse("https://portal.bitrix24.ru/rest/1/secret").unwrap());
        assert_eq!(config.webhook_url.as_str(), "https://portal.bitrix24.ru/rest/1/secret/");

        let config = ClientConfig::new(Url::parse("https://portal.bitrix24.ru/rest/1/secret/").unwrap());
        assert_eq!(config.webhook_url.as_str(), "https://portal.bitrix24.ru/rest/1/secret/");
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new(Url::parse("https://example.com/rest/1/x/").unwrap());

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_config.max_retries, 3);
        assert_eq!(config.page_limit, 0);
    }

    #[test]
    fn test_retry_config_no_retry() {
        let config = RetryConfig::no_retry();

        assert_eq!(config.max_retries, 0);
        assert_eq!(config.initial_backoff, Duration::from_millis(500));
    }
}
