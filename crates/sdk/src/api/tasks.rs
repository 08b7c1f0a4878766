//! Tasks API.

use super::into_records;
use crate::client::BitrixClient;
use crate::error::BitrixResult;
use b24_core::Record;
use serde_json::{json, Value};

/// API over `tasks.task.list`.
pub struct TasksApi<'a> {
    client: &'a BitrixClient,
}

impl<'a> TasksApi<'a> {
    pub(crate) fn new(client: &'a BitrixClient) -> Self {
        Self { client }
    }

    /// Tasks matching a filter. Items come back with camelCase keys
    /// (`createdDate`, `ufCrmTask`).
    pub async fn list(&self, filter: Value, select: &[&str]) -> BitrixResult<Vec<Record>> {
        let params = json!({
            "filter": filter,
            "select": select,
        });
        let items = self.client.http.list_all("tasks.task.list", &params).await?;
        Ok(into_records(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_reads_nested_tasks() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/1/key/tasks.task.list.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"tasks": [
                    {"id": "1", "createdDate": "2025-11-12T10:00:00+03:00", "ufCrmTask": ["D_5"]},
                    {"id": "2", "createdDate": "2025-11-12T11:00:00+03:00", "ufCrmTask": []}
                ]},
                "total": 2
            })))
            .mount(&server)
            .await;

        let client = BitrixClient::builder()
            .webhook_url(format!("{}/rest/1/key/", server.uri()))
            .retry_config(RetryConfig::no_retry())
            .build()
            .unwrap();

        let tasks = client
            .tasks()
            .list(json!({">=CREATED_DATE": "2025-11-10"}), &["ID", "CREATED_DATE", "UF_CRM_TASK"])
            .await
            .unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0]["ufCrmTask"], json!(["D_5"]));
    }
}
