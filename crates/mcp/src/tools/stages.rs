// Stage catalog and stage history tools

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_integer, json_schema_object, json_schema_string, parse_arguments, Tool,
};
use anyhow::{Context, Result};
use b24_core::datetime::DateRange;
use b24_core::stage_history::{
    group_by_owner, parse_events, render_aggregate, render_not_found, render_owner_history,
    EntityType, HistoryContext,
};
use b24_core::stages::{group_stages, stage_names, StageCatalog, DEAL_STAGE};
use b24_sdk::BitrixClient;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Fetch the stages of a status entity grouped by funnel. `DEAL_STAGE`
/// covers every deal funnel.
pub(crate) async fn load_stage_catalog(client: &BitrixClient, entity_id: &str) -> Result<StageCatalog> {
    if entity_id == DEAL_STAGE {
        let funnels = client
            .statuses()
            .all_deal_stages()
            .await
            .context("Failed to load deal stages")?;
        return Ok(group_stages(entity_id, &funnels.stages, &funnels.categories));
    }

    let stages = client
        .statuses()
        .list(entity_id)
        .await
        .with_context(|| format!("Failed to load statuses of {}", entity_id))?;
    Ok(group_stages(entity_id, &stages, &[]))
}

/// `STATUS_ID -> NAME` lookup; failures degrade to an empty map so reports
/// fall back to raw stage ids.
pub(crate) async fn load_stage_names(client: &BitrixClient, entity_id: &str) -> HashMap<String, String> {
    match load_stage_catalog(client, entity_id).await {
        Ok(catalog) => stage_names(&catalog),
        Err(e) => {
            tracing::warn!(entity_id = entity_id, error = %e, "Stage names unavailable");
            HashMap::new()
        }
    }
}

/// Tool returning stages grouped by funnel
pub struct GetStagesTool {
    client: Arc<BitrixClient>,
}

impl GetStagesTool {
    pub fn new(client: Arc<BitrixClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct GetStagesArgs {
    #[serde(default = "default_stage_entity")]
    entity_id: String,
}

fn default_stage_entity() -> String {
    DEAL_STAGE.to_string()
}

#[async_trait::async_trait]
impl Tool for GetStagesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_stages".to_string(),
            description: "Стадии в человекочитаемом виде, сгруппированные по воронкам. \
                Возвращает {category_id: {name, stages: {STATUS_ID: название}}}; \
                стадии без воронки попадают в ключ \"0\"."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "entity_id": json_schema_string(
                        "Тип статусов: DEAL_STAGE (по умолчанию), LEAD_STATUS, QUOTE_STATUS и т.д."
                    )
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: GetStagesArgs = parse_arguments("get_stages", arguments)?;
        let entity_id = if args.entity_id.trim().is_empty() {
            DEAL_STAGE.to_string()
        } else {
            args.entity_id.trim().to_string()
        };

        let catalog = load_stage_catalog(&self.client, &entity_id).await?;
        tracing::debug!(entity_id = %entity_id, funnels = catalog.len(), "Stage catalog loaded");

        Ok(CallToolResult::text(serde_json::to_string_pretty(&catalog)?))
    }
}

/// Tool rendering stage history with time spent per stage
pub struct StageHistoryTool {
    client: Arc<BitrixClient>,
}

impl StageHistoryTool {
    pub fn new(client: Arc<BitrixClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct StageHistoryArgs {
    entity_type_id: i64,
    #[serde(default)]
    owner_id: Option<i64>,
    #[serde(default)]
    from_date: Option<String>,
    #[serde(default)]
    to_date: Option<String>,
}

#[async_trait::async_trait]
impl Tool for StageHistoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_stage_history_human".to_string(),
            description: "История движения по стадиям с расчетом времени в каждой стадии. \
                С owner_id возвращает детальную историю объекта, без него среднее время \
                нахождения в стадиях по всем объектам типа."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "entity_type_id": json_schema_integer(
                        "Тип сущности: 1 лид, 2 сделка, 5 счет (старый), 31 счет (новый)"
                    ),
                    "owner_id": json_schema_integer("ID объекта; без него считается агрегированная статистика"),
                    "from_date": json_schema_string("Начало периода, YYYY-MM-DD или YYYY-MM-DDTHH:MM:SS"),
                    "to_date": json_schema_string("Конец периода, YYYY-MM-DD или YYYY-MM-DDTHH:MM:SS")
                }),
                vec!["entity_type_id"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: StageHistoryArgs = parse_arguments("get_stage_history_human", arguments)?;
        let entity = EntityType::from_id(args.entity_type_id);
        let range = DateRange::new(args.from_date.as_deref(), args.to_date.as_deref());

        let mut filter = Map::new();
        if let Some(from) = &range.from {
            filter.insert(">=CREATED_TIME".to_string(), json!(from));
        }
        if let Some(to) = &range.to {
            filter.insert("<=CREATED_TIME".to_string(), json!(to));
        }

        let records = self
            .client
            .stage_history()
            .list(
                entity.id(),
                args.owner_id,
                (!filter.is_empty()).then_some(filter),
            )
            .await
            .context("Failed to load stage history")?;

        let events = parse_events(&records);
        if events.is_empty() {
            return Ok(CallToolResult::text(render_not_found(entity, args.owner_id)));
        }

        let names = load_stage_names(&self.client, entity.status_entity()).await;
        let histories = group_by_owner(events);
        let ctx = HistoryContext {
            entity,
            range: &range,
            stage_names: &names,
        };

        tracing::info!(
            entity_type_id = entity.id(),
            owners = histories.len(),
            "Stage history rendered"
        );

        let text = match args.owner_id {
            Some(_) => render_owner_history(&ctx, &histories, Utc::now()),
            None => render_aggregate(&ctx, &histories),
        };
        Ok(CallToolResult::text(text))
    }
}
