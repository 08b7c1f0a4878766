// Deal tools: filtered deal listing and the deals-at-risk report

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::fields::load_field_catalog;
use crate::tools::stages::load_stage_names;
use crate::tools::{
    json_schema_array, json_schema_map, json_schema_object, json_schema_string, parse_arguments,
    Tool,
};
use anyhow::{Context, Result};
use b24_core::datetime::parse_bitrix_datetime;
use b24_core::record::{display_value, field_text};
use b24_core::risk::{
    assess, render_risk_report, task_links_deal, ActivitySummary, DealAtRisk,
    ACTIVITY_WINDOW_DAYS, CALL_ACTIVITY_TYPE,
};
use b24_core::stages::DEAL_STAGE;
use b24_core::Record;
use b24_sdk::{BitrixClient, EntityKind};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Add `required` fields to a select list unless it already selects `*`
fn ensure_fields(fields: &mut Vec<String>, required: &[&str]) {
    if fields.iter().any(|f| f == "*") {
        return;
    }
    for field in required {
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }
}

/// Keep only the requested fields, in request order; absent fields become null
fn project(deal: Record, fields: &[String]) -> Record {
    if fields.iter().any(|f| f == "*") {
        return deal;
    }
    fields
        .iter()
        .map(|field| (field.clone(), deal.get(field).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Tool listing deals by filter in human-readable form
pub struct ListDealTool {
    client: Arc<BitrixClient>,
}

impl ListDealTool {
    pub fn new(client: Arc<BitrixClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ListDealArgs {
    #[serde(default)]
    filter_fields: Map<String, Value>,
    #[serde(default = "default_list_fields")]
    fields_id: Vec<String>,
}

fn default_list_fields() -> Vec<String> {
    vec!["ID".to_string(), "TITLE".to_string()]
}

#[async_trait::async_trait]
impl Tool for ListDealTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "list_deal".to_string(),
            description: "Список сделок по фильтру. filter_fields: поля фильтрации, например \
                {\"TITLE\": \"test\", \">=DATE_CREATE\": \"2025-06-09\"}. fields_id: поля, \
                которые нужно получить (включая поля фильтра); [\"*\", \"UF_*\"] для всех полей."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "filter_fields": json_schema_map("Фильтр Bitrix24 с префиксами операторов (>=, <, !, %)"),
                    "fields_id": json_schema_array(json_schema_string("Код поля"), "Поля сделки, по умолчанию [\"ID\", \"TITLE\"]")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: ListDealArgs = parse_arguments("list_deal", arguments)?;
        let mut fields = args.fields_id;
        ensure_fields(&mut fields, &["ID", "TITLE"]);

        let status_names = load_stage_names(&self.client, DEAL_STAGE).await;
        let catalog = load_field_catalog(&self.client, EntityKind::Deal, status_names).await?;

        let deals = self
            .client
            .crm(EntityKind::Deal)
            .list(Value::Object(args.filter_fields.clone()), &fields)
            .await
            .context("Failed to load deals")?;
        tracing::info!(count = deals.len(), "Deals loaded");

        let mut text = format!(
            "Список сделок по фильтру {}:\n",
            Value::Object(args.filter_fields)
        );
        for deal in deals {
            let deal = project(deal, &fields);
            let title = deal.get("TITLE").map(display_value).unwrap_or_default();
            text.push_str(&format!("=={}==\n", title));
            for (label, value) in catalog.humanize(&deal) {
                text.push_str(&format!("  {}: {}\n", label, value));
            }
            text.push('\n');
        }

        Ok(CallToolResult::text(text))
    }
}

/// Tool flagging deals with a stale stage or no recent activity
pub struct DealsAtRiskTool {
    client: Arc<BitrixClient>,
}

impl DealsAtRiskTool {
    pub fn new(client: Arc<BitrixClient>) -> Self {
        Self { client }
    }

    /// Tasks created inside the window; matched to deals through
    /// `UF_CRM_TASK` afterwards
    async fn recent_tasks(&self, since: &str) -> Vec<Record> {
        let result = self
            .client
            .tasks()
            .list(
                json!({">=CREATED_DATE": since}),
                &["ID", "TITLE", "CREATED_DATE", "UF_CRM_TASK"],
            )
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load tasks, counting none");
            Vec::new()
        })
    }

    /// Calls, timeline comments and linked tasks of one deal since `since`
    async fn deal_activity(&self, deal_id: &str, since: DateTime<Utc>, tasks: &[Record]) -> ActivitySummary {
        let mut summary = ActivitySummary::default();
        let since_iso = since.to_rfc3339_opts(SecondsFormat::Secs, false);

        let activities = self
            .client
            .activities()
            .list(
                json!({
                    "OWNER_TYPE_ID": EntityKind::Deal.entity_type_id(),
                    "OWNER_ID": deal_id,
                    ">=CREATED": since_iso,
                }),
                &["ID", "TYPE_ID", "CREATED"],
            )
            .await;
        match activities {
            Ok(activities) => {
                summary.calls = activities
                    .iter()
                    .filter(|a| field_text(a, "TYPE_ID").as_deref() == Some(CALL_ACTIVITY_TYPE))
                    .count();
                for activity in &activities {
                    summary.observe(field_text(activity, "CREATED"));
                }
            }
            Err(e) => tracing::warn!(deal_id = deal_id, error = %e, "Failed to load activities"),
        }

        match self
            .client
            .activities()
            .timeline_comments(EntityKind::Deal.owner_type(), deal_id)
            .await
        {
            Ok(comments) => {
                let recent: Vec<&Record> = comments
                    .iter()
                    .filter(|c| {
                        field_text(c, "CREATED")
                            .and_then(|s| parse_bitrix_datetime(&s))
                            .is_some_and(|at| at >= since)
                    })
                    .collect();
                summary.comments = recent.len();
                for comment in recent {
                    summary.observe(field_text(comment, "CREATED"));
                }
            }
            Err(e) => tracing::warn!(deal_id = deal_id, error = %e, "Failed to load timeline comments"),
        }

        for task in tasks.iter().filter(|t| task_links_deal(t, deal_id)) {
            summary.tasks += 1;
            summary.observe(field_text(task, "CREATED_DATE").or_else(|| field_text(task, "createdDate")));
        }

        summary
    }
}

#[derive(Debug, Deserialize)]
struct DealsAtRiskArgs {
    #[serde(default)]
    filter_fields: Map<String, Value>,
    #[serde(default = "default_risk_fields")]
    fields_id: Vec<String>,
}

const RISK_FIELDS: [&str; 5] = ["ID", "TITLE", "STAGE_ID", "DATE_MODIFY", "DATE_CREATE"];

fn default_risk_fields() -> Vec<String> {
    RISK_FIELDS[..4].iter().map(|f| f.to_string()).collect()
}

#[async_trait::async_trait]
impl Tool for DealsAtRiskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_deals_at_risk".to_string(),
            description: "Сделки в риске: стадия не менялась более 5 рабочих дней или нет \
                активности (звонки, комментарии, задачи) более 3 дней. Возвращает список \
                сделок с причинами."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "filter_fields": json_schema_map("Дополнительный фильтр сделок, например {\"CLOSED\": \"N\"}"),
                    "fields_id": json_schema_array(json_schema_string("Код поля"), "Поля сделки для выборки")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: DealsAtRiskArgs = parse_arguments("get_deals_at_risk", arguments)?;
        let mut fields = args.fields_id;
        ensure_fields(&mut fields, &RISK_FIELDS);

        let deals = self
            .client
            .crm(EntityKind::Deal)
            .list(Value::Object(args.filter_fields), &fields)
            .await
            .context("Failed to load deals")?;
        if deals.is_empty() {
            return Ok(CallToolResult::text("Сделки по указанным фильтрам не найдены."));
        }

        let stage_names = load_stage_names(&self.client, DEAL_STAGE).await;
        let now = Utc::now();
        let since = now - Duration::days(ACTIVITY_WINDOW_DAYS);
        let tasks = self
            .recent_tasks(&since.to_rfc3339_opts(SecondsFormat::Secs, false))
            .await;

        let mut at_risk = Vec::new();
        for deal in &deals {
            let Some(deal_id) = field_text(deal, "ID") else {
                continue;
            };
            let activity = self.deal_activity(&deal_id, since, &tasks).await;
            let reasons = assess(deal, &activity, now);
            if !reasons.is_empty() {
                at_risk.push(DealAtRisk::new(deal, reasons, activity));
            }
        }

        tracing::info!(checked = deals.len(), at_risk = at_risk.len(), "Deal risk assessed");
        Ok(CallToolResult::text(render_risk_report(deals.len(), &at_risk, &stage_names)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{client_for, mount_result};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_ensure_fields() {
        let mut fields = vec!["OPPORTUNITY".to_string(), "ID".to_string()];
        ensure_fields(&mut fields, &["ID", "TITLE"]);
        assert_eq!(fields, vec!["OPPORTUNITY", "ID", "TITLE"]);

        let mut fields = vec!["*".to_string()];
        ensure_fields(&mut fields, &["ID", "TITLE"]);
        assert_eq!(fields, vec!["*"]);
    }

    #[test]
    fn test_project() {
        let deal: Record = json!({"ID": "1", "TITLE": "A", "OPPORTUNITY": "5"})
            .as_object()
            .cloned()
            .unwrap();

        let projected = project(deal.clone(), &["TITLE".to_string(), "COMMENTS".to_string()]);
        assert_eq!(Value::Object(projected), json!({"TITLE": "A", "COMMENTS": null}));

        let all = project(deal.clone(), &["*".to_string(), "UF_*".to_string()]);
        assert_eq!(all, deal);
    }

    #[tokio::test]
    async fn test_list_deal_renders_humanized_blocks() {
        let server = MockServer::start().await;
        mount_result(&server, "crm.category.list", json!({"categories": []})).await;
        mount_result(&server, "crm.status.list", json!([{"STATUS_ID": "NEW", "NAME": "Новая"}])).await;
        mount_result(&server, "crm.deal.fields", json!({
            "ID": {"type": "integer", "title": "ID"},
            "TITLE": {"type": "string", "title": "Название"},
            "STAGE_ID": {"type": "crm_status", "title": "Стадия сделки"}
        }))
        .await;
        mount_result(&server, "crm.deal.userfield.list", json!([])).await;

        Mock::given(method("POST"))
            .and(path("/rest/1/key/crm.deal.list.json"))
            .and(body_partial_json(json!({"select": ["STAGE_ID", "ID", "TITLE"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"ID": "12", "TITLE": "Поставка", "STAGE_ID": "NEW"}]
            })))
            .mount(&server)
            .await;

        let tool = ListDealTool::new(client_for(&server));
        let result = tool
            .execute(json!({"filter_fields": {"STAGE_ID": "NEW"}, "fields_id": ["STAGE_ID"]}))
            .await
            .unwrap();
        let text = result.joined_text();

        assert!(text.starts_with("Список сделок по фильтру {\"STAGE_ID\":\"NEW\"}:\n"));
        assert!(text.contains("==Поставка==\n  Стадия сделки: Новая\n  ID: 12\n  Название: Поставка\n"));
    }

    #[tokio::test]
    async fn test_deals_at_risk_without_deals() {
        let server = MockServer::start().await;
        mount_result(&server, "crm.deal.list", json!([])).await;

        let tool = DealsAtRiskTool::new(client_for(&server));
        let result = tool.execute(json!({"filter_fields": {"CLOSED": "N"}})).await.unwrap();

        assert_eq!(result.joined_text(), "Сделки по указанным фильтрам не найдены.");
    }

    #[tokio::test]
    async fn test_deals_at_risk_flags_idle_deal() {
        let server = MockServer::start().await;
        mount_result(&server, "crm.deal.list", json!([
            {"ID": "5", "TITLE": "Забытая", "STAGE_ID": "NEW", "DATE_MODIFY": "2020-01-06T10:00:00+00:00"}
        ]))
        .await;
        mount_result(&server, "crm.category.list", json!({"categories": []})).await;
        mount_result(&server, "crm.status.list", json!([{"STATUS_ID": "NEW", "NAME": "Новая"}])).await;
        mount_result(&server, "tasks.task.list", json!({"tasks": []})).await;
        mount_result(&server, "crm.activity.list", json!([])).await;
        // Timeline comments fail; the deal is still assessed
        Mock::given(method("POST"))
            .and(path("/rest/1/key/crm.timeline.comment.list.json"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "ACCESS_DENIED"})))
            .mount(&server)
            .await;

        let tool = DealsAtRiskTool::new(client_for(&server));
        let text = tool.execute(json!({})).await.unwrap().joined_text();

        assert!(text.contains("Всего проверено сделок: 1"));
        assert!(text.contains("1. Забытая (ID: 5)"));
        assert!(text.contains("   Стадия: Новая (NEW)"));
        assert!(text.contains("Статус не менялся"));
        assert!(text.contains("Отсутствует активность"));
    }
}
