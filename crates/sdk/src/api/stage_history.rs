//! Stage history API.

use super::into_records;
use crate::client::BitrixClient;
use crate::error::BitrixResult;
use b24_core::Record;
use serde_json::{json, Map, Value};

/// API over `crm.stagehistory.list`.
pub struct StageHistoryApi<'a> {
    client: &'a BitrixClient,
}

impl<'a> StageHistoryApi<'a> {
    pub(crate) fn new(client: &'a BitrixClient) -> Self {
        Self { client }
    }

    /// Stage-change events of an entity type, oldest first. `filter` is
    /// merged with the owner constraint when `owner_id` is given.
    pub async fn list(
        &self,
        entity_type_id: i64,
        owner_id: Option<i64>,
        filter: Option<Map<String, Value>>,
    ) -> BitrixResult<Vec<Record>> {
        let mut filter = filter.unwrap_or_default();
        if let Some(owner_id) = owner_id {
            filter.insert("OWNER_ID".to_string(), json!(owner_id));
        }

        let params = json!({
            "entityTypeId": entity_type_id,
            "order": {"CREATED_TIME": "ASC"},
            "filter": filter,
            "select": ["ID", "TYPE_ID", "OWNER_ID", "CREATED_TIME", "CATEGORY_ID", "STAGE_SEMANTIC_ID", "STAGE_ID", "STATUS_ID"],
        });

        let items = self
            .client
            .http
            .list_all("crm.stagehistory.list", &params)
            .await?;
        Ok(into_records(items))
    }
}
