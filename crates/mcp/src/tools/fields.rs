// Field metadata tool

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::{json_schema_array, json_schema_object, json_schema_string, parse_arguments, Tool};
use anyhow::{Context, Result};
use b24_core::fields::FieldCatalog;
use b24_sdk::{BitrixClient, EntityKind};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Field descriptors of an entity merged with its user field definitions.
/// Missing user fields only cost the nicer labels, so that failure is logged.
pub(crate) async fn load_field_catalog(
    client: &BitrixClient,
    kind: EntityKind,
    status_names: HashMap<String, String>,
) -> Result<FieldCatalog> {
    let descriptors = client
        .crm(kind)
        .fields()
        .await
        .with_context(|| format!("Failed to load {} fields", kind))?;

    let mut catalog = FieldCatalog::from_fields(&descriptors);
    match client.crm(kind).userfields().await {
        Ok(userfields) => catalog.merge_userfields(&userfields),
        Err(e) => tracing::warn!(entity = %kind, error = %e, "User field labels unavailable"),
    }

    Ok(catalog.with_status_names(status_names))
}

/// Tool describing the fields of CRM entities
pub struct GetFieldsInfoTool {
    client: Arc<BitrixClient>,
}

impl GetFieldsInfoTool {
    pub fn new(client: Arc<BitrixClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct GetFieldsInfoArgs {
    #[serde(default = "default_entities")]
    entities: Vec<String>,
}

fn default_entities() -> Vec<String> {
    vec!["deal".to_string()]
}

#[async_trait::async_trait]
impl Tool for GetFieldsInfoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_fields_info".to_string(),
            description: "Описание полей сущностей CRM: код, название, тип, \
                множественность, обязательность и варианты списков."
                .to_string(),
            input_schema: json_schema_object(
                json!({
                    "entities": json_schema_array(
                        json_schema_string("deal, lead, contact или company"),
                        "Сущности, по умолчанию [\"deal\"]"
                    )
                }),
                vec![],
            ),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: GetFieldsInfoArgs = parse_arguments("get_fields_info", arguments)?;
        let entities = if args.entities.is_empty() {
            default_entities()
        } else {
            args.entities
        };

        let kinds = entities
            .iter()
            .map(|e| e.parse::<EntityKind>())
            .collect::<Result<Vec<_>, _>>();
        let kinds = match kinds {
            Ok(kinds) => kinds,
            Err(message) => return Ok(CallToolResult::error(message)),
        };

        let mut out = String::new();
        for kind in kinds {
            let catalog = load_field_catalog(&self.client, kind, HashMap::new()).await?;
            out.push_str(&format!("=== Поля сущности {} ({}) ===\n", kind, catalog.len()));
            out.push_str(&catalog.describe());
            out.push('\n');
        }

        Ok(CallToolResult::text(out.trim_end().to_string()))
    }
}
