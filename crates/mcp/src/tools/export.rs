// Export tools: dump CRM entities to a JSON file and aggregate such files

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{
    json_schema_array, json_schema_map, json_schema_object, json_schema_string, parse_arguments,
    Tool,
};
use anyhow::{bail, Context, Result};
use b24_core::{analyze, load_export, AnalysisRequest, Condition, Operation};
use b24_sdk::{BitrixClient, EntityKind};
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Build a condition from a tool argument: either an expression string or
/// an object of field equalities. Empty input means "no filter".
pub fn condition_from_value(value: &Value) -> Result<Option<Condition>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(Condition::parse(s)?)),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Object(map) => Ok(Some(Condition::from_equalities(map))),
        other => bail!("condition must be a string or an object, got {}", other),
    }
}

/// Tool exporting CRM entities into a timestamped JSON file
pub struct ExportEntitiesTool {
    client: Arc<BitrixClient>,
    exports_dir: PathBuf,
}

impl ExportEntitiesTool {
    pub fn new(client: Arc<BitrixClient>, exports_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            exports_dir: exports_dir.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExportArgs {
    #[serde(default = "default_entity")]
    entity: String,
    #[serde(default)]
    filter_fields: Map<String, Value>,
    #[serde(default = "default_export_fields")]
    fields_id: Vec<String>,
}

fn default_entity() -> String {
    "deal".to_string()
}

fn default_export_fields() -> Vec<String> {
    vec!["*".to_string(), "UF_*".to_string()]
}

#[async_trait::async_trait]
impl Tool for ExportEntitiesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "export_entities".to_string(),
            description: "Выгрузка сущностей CRM (deal, lead, contact, company) по фильтру в \
                JSON-файл для последующего анализа через analyze_export_file. Возвращает путь \
                к файлу и количество записей."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "entity": json_schema_string("Сущность: deal (по умолчанию), lead, contact, company"),
                    "filter_fields": json_schema_map("Фильтр Bitrix24"),
                    "fields_id": json_schema_array(json_schema_string("Код поля"), "Поля выгрузки, по умолчанию [\"*\", \"UF_*\"]")
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: ExportArgs = parse_arguments("export_entities", arguments)?;
        let kind: EntityKind = match args.entity.parse() {
            Ok(kind) => kind,
            Err(message) => return Ok(CallToolResult::error(message)),
        };
        let fields = if args.fields_id.is_empty() {
            default_export_fields()
        } else {
            args.fields_id
        };

        let records = self
            .client
            .crm(kind)
            .list(Value::Object(args.filter_fields), &fields)
            .await
            .with_context(|| format!("Failed to load {} records", kind))?;

        tokio::fs::create_dir_all(&self.exports_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.exports_dir.display()))?;

        let file_name = format!("{}_export_{}.json", kind, Local::now().format("%Y%m%d_%H%M%S"));
        let path = self.exports_dir.join(file_name);
        let content = serde_json::to_vec_pretty(&records)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(entity = %kind, records = records.len(), path = %path.display(), "Export written");

        let summary = json!({
            "entity": kind,
            "file_path": path.display().to_string(),
            "count": records.len(),
        });
        Ok(CallToolResult::text(serde_json::to_string_pretty(&summary)?))
    }
}

/// Tool running count/sum/avg/min/max over an export file
pub struct AnalyzeExportTool {
    exports_dir: PathBuf,
}

impl AnalyzeExportTool {
    pub fn new(exports_dir: impl Into<PathBuf>) -> Self {
        Self {
            exports_dir: exports_dir.into(),
        }
    }

    /// Bare file names are looked up in the exports directory
    fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.exists() || path.is_absolute() {
            return path.to_path_buf();
        }
        let in_exports = self.exports_dir.join(path);
        if in_exports.exists() {
            in_exports
        } else {
            path.to_path_buf()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    file_path: String,
    operation: String,
    #[serde(default)]
    fields: Option<Vec<String>>,
    #[serde(default)]
    condition: Value,
    #[serde(default)]
    group_by: Option<Vec<String>>,
}

#[async_trait::async_trait]
impl Tool for AnalyzeExportTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "analyze_export_file".to_string(),
            description: "Анализ выгруженного JSON-файла: count, sum, avg, min, max с \
                фильтрацией по условию и группировкой. condition: выражение \
                (OPPORTUNITY > 1000 and STAGE_ID == 'WON') или объект равенств \
                {\"STAGE_ID\": \"WON\"}."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "file_path": json_schema_string("Путь к файлу выгрузки или имя файла в каталоге выгрузок"),
                    "operation": json_schema_string("count, sum, avg, min или max"),
                    "fields": json_schema_array(json_schema_string("Код поля"), "Поля для sum/avg/min/max"),
                    "condition": {
                        "type": ["string", "object"],
                        "description": "Условие фильтрации записей"
                    },
                    "group_by": json_schema_array(json_schema_string("Код поля"), "Поля группировки")
                }),
                vec!["file_path", "operation"],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: AnalyzeArgs = parse_arguments("analyze_export_file", arguments)?;
        let operation: Operation = args.operation.parse()?;

        let mut request = AnalysisRequest::new(operation);
        if let Some(fields) = args.fields.filter(|f| !f.is_empty()) {
            request = request.with_fields(fields);
        }
        if let Some(condition) = condition_from_value(&args.condition)? {
            request = request.with_condition(condition);
        }
        if let Some(group_by) = args.group_by.filter(|g| !g.is_empty()) {
            request = request.with_group_by(group_by);
        }

        let path = self.resolve(&args.file_path);
        let records = load_export(&path)?;
        let report = analyze(&records, &request)?;

        Ok(CallToolResult::text(serde_json::to_string_pretty(&report)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{client_for, mount_result};
    use wiremock::MockServer;

    fn write_export(dir: &Path, name: &str, records: Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_vec(&records).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_condition_from_value() {
        assert!(condition_from_value(&Value::Null).unwrap().is_none());
        assert!(condition_from_value(&json!("  ")).unwrap().is_none());
        assert!(condition_from_value(&json!({})).unwrap().is_none());
        assert!(condition_from_value(&json!("OPPORTUNITY > 10")).unwrap().is_some());
        assert!(condition_from_value(&json!({"STAGE_ID": "WON"})).unwrap().is_some());
        assert!(condition_from_value(&json!(5)).is_err());
        assert!(condition_from_value(&json!("OPPORTUNITY >")).is_err());
    }

    #[tokio::test]
    async fn test_export_writes_file() {
        let server = MockServer::start().await;
        mount_result(&server, "crm.contact.list", json!([{"ID": "1", "NAME": "Анна"}, {"ID": "2", "NAME": "Олег"}])).await;
        let dir = tempfile::tempdir().unwrap();
        let exports = dir.path().join("exports");

        let tool = ExportEntitiesTool::new(client_for(&server), &exports);
        let result = tool.execute(json!({"entity": "contact"})).await.unwrap();
        let summary: Value = serde_json::from_str(&result.joined_text()).unwrap();

        assert_eq!(summary["entity"], "contact");
        assert_eq!(summary["count"], 2);
        let file_path = PathBuf::from(summary["file_path"].as_str().unwrap());
        let name = file_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("contact_export_") && name.ends_with(".json"));

        let written: Value = serde_json::from_slice(&std::fs::read(&file_path).unwrap()).unwrap();
        assert_eq!(written[1]["NAME"], "Олег");
    }

    #[tokio::test]
    async fn test_export_unknown_entity() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let tool = ExportEntitiesTool::new(client_for(&server), dir.path());
        let result = tool.execute(json!({"entity": "invoice"})).await.unwrap();

        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_analyze_grouped_sum() {
        let dir = tempfile::tempdir().unwrap();
        write_export(
            dir.path(),
            "deal_export_20250818_195707.json",
            json!([
                {"ID": "1", "STAGE_ID": "WON", "OPPORTUNITY": "100.00"},
                {"ID": "2", "STAGE_ID": "NEW", "OPPORTUNITY": "50"},
                {"ID": "3", "STAGE_ID": "WON", "OPPORTUNITY": "25.5"}
            ]),
        );

        let tool = AnalyzeExportTool::new(dir.path());
        let result = tool
            .execute(json!({
                "file_path": "deal_export_20250818_195707.json",
                "operation": "sum",
                "fields": ["OPPORTUNITY"],
                "condition": "OPPORTUNITY >= 50",
                "group_by": ["STAGE_ID"]
            }))
            .await
            .unwrap();
        let report: Value = serde_json::from_str(&result.joined_text()).unwrap();

        assert_eq!(report["operation"], "sum");
        assert_eq!(report["total_records"], 2);
        assert_eq!(report["group_by"], json!(["STAGE_ID"]));
        assert_eq!(report["result"][0]["group"], json!({"STAGE_ID": "WON"}));
        assert_eq!(report["result"][0]["values"]["OPPORTUNITY"], 100);
        assert_eq!(report["result"][1]["values"]["OPPORTUNITY"], 50);
    }

    #[tokio::test]
    async fn test_analyze_count_with_object_condition() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_export(
            dir.path(),
            "leads.json",
            json!([{"SOURCE_ID": "WEB"}, {"SOURCE_ID": "CALL"}, {"SOURCE_ID": "WEB"}]),
        );

        let tool = AnalyzeExportTool::new(dir.path().join("unused"));
        let result = tool
            .execute(json!({
                "file_path": path.display().to_string(),
                "operation": "count",
                "condition": {"SOURCE_ID": "WEB"}
            }))
            .await
            .unwrap();
        let report: Value = serde_json::from_str(&result.joined_text()).unwrap();

        assert_eq!(report["total_records"], 2);
    }

    #[tokio::test]
    async fn test_analyze_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = AnalyzeExportTool::new(dir.path());

        let err = tool
            .execute(json!({"file_path": "nope.json", "operation": "count"}))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("file not found"));
    }
}
