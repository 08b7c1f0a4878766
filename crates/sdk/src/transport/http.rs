//! HTTP transport for Bitrix24 webhook calls.

use crate::config::ClientConfig;
use crate::error::{BitrixError, BitrixResult, QUERY_LIMIT_EXCEEDED};
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Keys under which list methods nest their items inside `result`.
const NESTED_ITEM_KEYS: [&str; 3] = ["items", "tasks", "categories"];

/// HTTP transport for making REST calls through an incoming webhook.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: Arc<ClientConfig>) -> BitrixResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    /// Build the URL of a REST method, e.g. `crm.deal.list` becomes
    /// `{webhook}crm.deal.list.json`.
    fn method_url(&self, method: &str) -> BitrixResult<url::Url> {
        Ok(self.config.webhook_url.join(&format!("{}.json", method))?)
    }

    fn should_retry(&self, error: &BitrixError) -> bool {
        match error {
            BitrixError::Http(e) => e.is_timeout() || e.is_connect(),
            BitrixError::Api { status, code, .. } => {
                code == QUERY_LIMIT_EXCEEDED || self.config.retry_config.should_retry_status(*status)
            }
            _ => false,
        }
    }

    /// Send one request and turn the Bitrix24 envelope into a result.
    async fn send_once(&self, url: &url::Url, params: &Value) -> BitrixResult<Value> {
        let response = self.client.post(url.clone()).json(params).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(BitrixError::from_response(status, &body));
        }

        let envelope: Value = serde_json::from_str(&body)?;
        if envelope.get("error").is_some() {
            return Err(BitrixError::from_response(status, &body));
        }

        Ok(envelope)
    }

    /// Execute a request with retries, returning the whole response envelope
    /// (`result`, `next`, `total`, `time`).
    async fn execute_with_retry(&self, method: &str, params: &Value) -> BitrixResult<Value> {
        let url = self.method_url(method)?;
        let retry_config = &self.config.retry_config;
        let mut attempts = 0;

        loop {
            match self.send_once(&url, params).await {
                Ok(envelope) => return Ok(envelope),
                Err(e) if attempts < retry_config.max_retries && self.should_retry(&e) => {
                    let backoff = retry_config.backoff_for_attempt(attempts);
                    warn!(
                        method = method,
                        error = %e,
                        attempt = attempts + 1,
                        backoff_ms = backoff.as_millis(),
                        "Bitrix24 call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Call a REST method and return its `result` value.
    pub async fn call(&self, method: &str, params: &Value) -> BitrixResult<Value> {
        debug!(method = method, "Bitrix24 call");

        let mut envelope = self.execute_with_retry(method, params).await?;
        Ok(envelope
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    /// Call a list method and follow `next` offsets until every page is read
    /// or the configured page limit is reached.
    pub async fn list_all(&self, method: &str, params: &Value) -> BitrixResult<Vec<Value>> {
        let mut params = match params {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(BitrixError::Config(format!(
                    "Parameters of {} must be an object, got {}",
                    method, other
                )))
            }
        };

        let mut items = Vec::new();
        let mut pages = 0usize;

        loop {
            let envelope = self
                .execute_with_retry(method, &Value::Object(params.clone()))
                .await?;
            pages += 1;

            let page = extract_items(method, envelope.get("result"))?;
            debug!(method = method, page = pages, count = page.len(), "Bitrix24 list page");
            items.extend(page);

            let next = envelope.get("next").and_then(Value::as_u64);
            match next {
                Some(start) if self.config.page_limit == 0 || pages < self.config.page_limit => {
                    params.insert("start".to_string(), Value::from(start));
                }
                Some(_) => {
                    warn!(
                        method = method,
                        pages = pages,
                        "Page limit reached, result is truncated"
                    );
                    break;
                }
                None => break,
            }
        }

        Ok(items)
    }
}

/// Find the item array of a list response.
fn extract_items(method: &str, result: Option<&Value>) -> BitrixResult<Vec<Value>> {
    match result {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::Object(map)) => NESTED_ITEM_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .cloned()
            .ok_or_else(|| BitrixError::UnexpectedResponse {
                method: method.to_string(),
                message: "result object has no item list".to_string(),
            }),
        Some(other) => Err(BitrixError::UnexpectedResponse {
            method: method.to_string(),
            message: format!("expected a list result, got {}", other),
        }),
    }
}
