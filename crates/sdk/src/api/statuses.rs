//! Status (stage) and funnel API.

use super::into_records;
use crate::client::BitrixClient;
use crate::error::BitrixResult;
use b24_core::record::field_text;
use b24_core::stages::{deal_stage_entity, DEAL_STAGE};
use b24_core::Record;
use serde_json::json;

/// Deal funnels together with the stages of every funnel.
#[derive(Debug, Clone, Default)]
pub struct DealStages {
    pub categories: Vec<Record>,
    pub stages: Vec<Record>,
}

/// API over `crm.status.list` and `crm.category.list`.
pub struct StatusesApi<'a> {
    client: &'a BitrixClient,
}

impl<'a> StatusesApi<'a> {
    pub(crate) fn new(client: &'a BitrixClient) -> Self {
        Self { client }
    }

    /// Statuses of one entity, e.g. `DEAL_STAGE`, `DEAL_STAGE_3`, `SOURCE`.
    pub async fn list(&self, entity_id: &str) -> BitrixResult<Vec<Record>> {
        let params = json!({
            "filter": {"ENTITY_ID": entity_id},
            "order": {"SORT": "ASC"},
        });
        let items = self.client.http.list_all("crm.status.list", &params).await?;
        Ok(into_records(items))
    }

    /// Deal funnels.
    pub async fn deal_categories(&self) -> BitrixResult<Vec<Record>> {
        let params = json!({"entityTypeId": 2});
        let items = self.client.http.list_all("crm.category.list", &params).await?;
        Ok(into_records(items))
    }

    /// Stages of the default funnel plus every custom funnel.
    pub async fn all_deal_stages(&self) -> BitrixResult<DealStages> {
        let categories = self.deal_categories().await?;
        let mut stages = self.list(DEAL_STAGE).await?;

        for category in &categories {
            let Some(id) = field_text(category, "id").or_else(|| field_text(category, "ID")) else {
                continue;
            };
            if id == "0" || id.is_empty() {
                continue;
            }
            stages.extend(self.list(&deal_stage_entity(&id)).await?);
        }

        Ok(DealStages { categories, stages })
    }
}
