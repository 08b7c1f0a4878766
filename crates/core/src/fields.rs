// Field metadata and human-readable rendering of CRM records

use crate::record::{display_value, field_text, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

const EMPTY_VALUE: &str = "не указано";

/// Metadata of one CRM field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub code: String,
    pub label: String,
    pub field_type: String,
    pub is_multiple: bool,
    pub is_required: bool,
    /// Enumeration items as `(ID, VALUE)`
    pub items: Vec<(String, String)>,
}

/// Field metadata of one entity kind plus status names for `crm_status`
/// fields
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: BTreeMap<String, FieldInfo>,
    status_names: HashMap<String, String>,
}

impl FieldCatalog {
    /// Build from a `crm.<entity>.fields` result
    pub fn from_fields(result: &Map<String, Value>) -> Self {
        let fields = result
            .iter()
            .filter_map(|(code, descriptor)| {
                let descriptor = descriptor.as_object()?;
                let label = ["formLabel", "listLabel", "title"]
                    .iter()
                    .find_map(|key| descriptor.get(*key).and_then(label_text))
                    .unwrap_or_else(|| code.clone());

                Some((
                    code.clone(),
                    FieldInfo {
                        code: code.clone(),
                        label,
                        field_type: field_text(descriptor, "type").unwrap_or_default(),
                        is_multiple: flag(descriptor.get("isMultiple")),
                        is_required: flag(descriptor.get("isRequired")),
                        items: enumeration_items(descriptor.get("items")),
                    },
                ))
            })
            .collect();

        Self {
            fields,
            status_names: HashMap::new(),
        }
    }

    /// Merge `crm.<entity>.userfield.list` entries. Userfield labels and
    /// enumeration lists win over the generic descriptors.
    pub fn merge_userfields(&mut self, userfields: &[Record]) {
        for userfield in userfields {
            let Some(code) = field_text(userfield, "FIELD_NAME") else {
                continue;
            };

            let entry = self.fields.entry(code.clone()).or_insert_with(|| FieldInfo {
                code: code.clone(),
                label: code.clone(),
                ..Default::default()
            });

            if let Some(label) = ["EDIT_FORM_LABEL", "LIST_COLUMN_LABEL", "LIST_FILTER_LABEL"]
                .iter()
                .find_map(|key| userfield.get(*key).and_then(label_text))
            {
                entry.label = label;
            }
            if let Some(user_type) = field_text(userfield, "USER_TYPE_ID") {
                entry.field_type = user_type;
            }
            entry.is_multiple |= flag(userfield.get("MULTIPLE"));
            entry.is_required |= flag(userfield.get("MANDATORY"));

            let items = enumeration_items(userfield.get("LIST"));
            if !items.is_empty() {
                entry.items = items;
            }
        }
    }

    /// Names used to render `crm_status` fields such as `STAGE_ID`
    pub fn with_status_names(mut self, names: HashMap<String, String>) -> Self {
        self.status_names = names;
        self
    }

    pub fn get(&self, code: &str) -> Option<&FieldInfo> {
        self.fields.get(code)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Human label of a field, falling back to its code
    pub fn label<'a>(&'a self, code: &'a str) -> &'a str {
        self.fields.get(code).map(|f| f.label.as_str()).unwrap_or(code)
    }

    /// Render a record as `(label, value)` pairs in record order
    pub fn humanize(&self, record: &Record) -> Vec<(String, String)> {
        record
            .iter()
            .map(|(code, value)| (self.label(code).to_string(), self.render_value(code, value)))
            .collect()
    }

    /// Render one field value for a human reader
    pub fn render_value(&self, code: &str, value: &Value) -> String {
        if is_empty_value(value) {
            return EMPTY_VALUE.to_string();
        }

        let Some(info) = self.fields.get(code) else {
            return display_value(value);
        };

        let render_one = |v: &Value| -> String {
            let raw = display_value(v);
            match info.field_type.as_str() {
                "enumeration" => info
                    .items
                    .iter()
                    .find(|(id, _)| *id == raw)
                    .map(|(_, text)| text.clone())
                    .unwrap_or(raw),
                "boolean" | "char" => match v {
                    Value::Bool(true) => "Да".to_string(),
                    Value::Bool(false) => "Нет".to_string(),
                    _ => match raw.as_str() {
                        "Y" | "1" => "Да".to_string(),
                        "N" | "0" => "Нет".to_string(),
                        _ => raw,
                    },
                },
                "crm_status" => self.status_names.get(&raw).cloned().unwrap_or(raw),
                "money" => raw.replacen('|', " ", 1),
                _ => raw,
            }
        };

        match value {
            Value::Array(items) => items.iter().map(render_one).collect::<Vec<_>>().join(", "),
            other => render_one(other),
        }
    }

    /// Text description of every field, used by the fields-info tool
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for info in self.fields.values() {
            out.push_str(&format!("{} — {} ({})", info.code, info.label, info.field_type));
            if info.is_multiple {
                out.push_str(", множественное");
            }
            if info.is_required {
                out.push_str(", обязательное");
            }
            out.push('\n');

            if !info.items.is_empty() {
                let values = info
                    .items
                    .iter()
                    .map(|(id, value)| format!("{}={}", id, value))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!("    варианты: {}\n", values));
            }
        }
        out
    }
}

/// Labels come either as plain strings or as `{lang: text}` maps
fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => ["ru", "en"]
            .iter()
            .find_map(|lang| map.get(*lang).and_then(label_text))
            .or_else(|| map.values().find_map(label_text)),
        _ => None,
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "Y" | "1" | "true"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn enumeration_items(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let item = item.as_object()?;
            Some((field_text(item, "ID")?, field_text(item, "VALUE").unwrap_or_default()))
        })
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> FieldCatalog {
        let fields = json!({
            "ID": {"type": "integer", "isRequired": false, "isMultiple": false, "title": "ID"},
            "TITLE": {"type": "string", "isRequired": true, "title": "Название"},
            "STAGE_ID": {"type": "crm_status", "statusType": "DEAL_STAGE", "title": "Стадия сделки"},
            "OPENED": {"type": "char", "title": "Доступна для всех"},
            "OPPORTUNITY": {"type": "double", "title": "Сумма"},
            "UF_CRM_1749724770090": {
                "type": "enumeration",
                "isMultiple": false,
                "title": "UF_CRM_1749724770090",
                "listLabel": "Склад",
                "formLabel": "",
                "items": [{"ID": "45", "VALUE": "Подвал"}, {"ID": "47", "VALUE": "Офис"}]
            },
            "UF_CRM_PRICE": {"type": "money", "title": "UF_CRM_PRICE"}
        });
        let userfields = json!([
            {"FIELD_NAME": "UF_CRM_PRICE", "USER_TYPE_ID": "money", "MULTIPLE": "N", "MANDATORY": "Y",
             "EDIT_FORM_LABEL": {"en": "Price", "ru": "Цена"}},
            {"FIELD_NAME": "UF_CRM_TAGS", "USER_TYPE_ID": "enumeration", "MULTIPLE": "Y",
             "LIST_COLUMN_LABEL": "Теги", "LIST": [{"ID": "1", "VALUE": "VIP"}, {"ID": "2", "VALUE": "Опт"}]}
        ]);

        let mut catalog = FieldCatalog::from_fields(fields.as_object().unwrap());
        let userfields: Vec<Record> = userfields
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        catalog.merge_userfields(&userfields);
        catalog.with_status_names(HashMap::from([("NEW".to_string(), "Новая".to_string())]))
    }

    #[test]
    fn test_labels() {
        let catalog = catalog();

        assert_eq!(catalog.label("TITLE"), "Название");
        assert_eq!(catalog.label("UF_CRM_1749724770090"), "Склад");
        assert_eq!(catalog.label("UF_CRM_PRICE"), "Цена");
        assert_eq!(catalog.label("UF_CRM_TAGS"), "Теги");
        assert_eq!(catalog.label("UNKNOWN"), "UNKNOWN");
        assert_eq!(catalog.len(), 8);
    }

    #[test]
    fn test_humanize_record() {
        let catalog = catalog();
        let deal = json!({
            "ID": "12",
            "TITLE": "тестовая сделка",
            "STAGE_ID": "NEW",
            "OPENED": "Y",
            "OPPORTUNITY": "10000",
            "UF_CRM_1749724770090": "47",
            "UF_CRM_PRICE": "150|RUB",
            "UF_CRM_TAGS": ["1", "2", "3"],
            "COMMENTS": null
        });

        let rendered = catalog.humanize(deal.as_object().unwrap());

        assert_eq!(
            rendered,
            vec![
                ("ID".to_string(), "12".to_string()),
                ("Название".to_string(), "тестовая сделка".to_string()),
                ("Стадия сделки".to_string(), "Новая".to_string()),
                ("Доступна для всех".to_string(), "Да".to_string()),
                ("Сумма".to_string(), "10000".to_string()),
                ("Склад".to_string(), "Офис".to_string()),
                ("Цена".to_string(), "150 RUB".to_string()),
                ("Теги".to_string(), "VIP, Опт, 3".to_string()),
                ("COMMENTS".to_string(), "не указано".to_string()),
            ]
        );
    }

    #[test]
    fn test_describe() {
        let text = catalog().describe();

        assert!(text.contains("TITLE — Название (string), обязательное\n"));
        assert!(text.contains("UF_CRM_TAGS — Теги (enumeration), множественное\n    варианты: 1=VIP, 2=Опт\n"));
        assert!(text.contains("UF_CRM_PRICE — Цена (money), обязательное\n"));
    }
}
