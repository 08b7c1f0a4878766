//! Activities and timeline API.

use super::into_records;
use crate::client::BitrixClient;
use crate::error::BitrixResult;
use b24_core::Record;
use serde_json::{json, Value};

/// API over `crm.activity.list` and `crm.timeline.comment.list`.
pub struct ActivitiesApi<'a> {
    client: &'a BitrixClient,
}

impl<'a> ActivitiesApi<'a> {
    pub(crate) fn new(client: &'a BitrixClient) -> Self {
        Self { client }
    }

    /// Activities (calls, meetings, e-mails) matching a filter.
    pub async fn list(&self, filter: Value, select: &[&str]) -> BitrixResult<Vec<Record>> {
        let params = json!({
            "filter": filter,
            "select": select,
            "order": {"ID": "DESC"},
        });
        let items = self.client.http.list_all("crm.activity.list", &params).await?;
        Ok(into_records(items))
    }

    /// Timeline comments of one CRM item. `entity_type` is the owner type,
    /// e.g. `DEAL`.
    pub async fn timeline_comments(&self, entity_type: &str, entity_id: &str) -> BitrixResult<Vec<Record>> {
        let params = json!({
            "filter": {
                "ENTITY_TYPE": entity_type.to_lowercase(),
                "ENTITY_ID": entity_id,
            },
            "select": ["ID", "CREATED", "AUTHOR_ID", "COMMENT"],
        });
        let items = self
            .client
            .http
            .list_all("crm.timeline.comment.list", &params)
            .await?;
        Ok(into_records(items))
    }
}
