// Stage catalog grouped by sales funnel (deal category)

use crate::record::{field_text, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Status entity id of deal stages
pub const DEAL_STAGE: &str = "DEAL_STAGE";

const DEFAULT_FUNNEL: &str = "Общая воронка";

/// One funnel with its stages (`STATUS_ID -> NAME`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCategory {
    pub name: String,
    pub stages: BTreeMap<String, String>,
}

/// Funnel id -> funnel
pub type StageCatalog = BTreeMap<String, StageCategory>;

/// Group `crm.status.list` entries by funnel.
///
/// Deal stages are grouped by `CATEGORY_ID` and named after the matching
/// `crm.category.list` entry; stages without a category belong to the
/// default funnel `"0"`. Other status entities are returned flat under `"0"`.
pub fn group_stages(entity_id: &str, stages: &[Record], categories: &[Record]) -> StageCatalog {
    let mut catalog = StageCatalog::new();

    if entity_id != DEAL_STAGE {
        let flat = catalog.entry("0".to_string()).or_insert_with(|| StageCategory {
            name: "Все стадии".to_string(),
            stages: BTreeMap::new(),
        });
        for stage in stages {
            if let Some((status_id, name)) = stage_entry(stage) {
                flat.stages.insert(status_id, name);
            }
        }
        return catalog;
    }

    let mut names: HashMap<String, String> = categories
        .iter()
        .filter_map(|category| {
            let id = category_id(category, "ID").or_else(|| category_id(category, "id"))?;
            let name = field_text(category, "NAME")
                .or_else(|| field_text(category, "name"))
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Без названия".to_string());
            Some((id, name))
        })
        .collect();
    names.insert("0".to_string(), DEFAULT_FUNNEL.to_string());

    for stage in stages {
        let category = category_id(stage, "CATEGORY_ID").unwrap_or_else(|| "0".to_string());
        let entry = catalog.entry(category.clone()).or_insert_with(|| StageCategory {
            name: names
                .get(&category)
                .cloned()
                .unwrap_or_else(|| format!("Воронка {}", category)),
            stages: BTreeMap::new(),
        });

        if let Some((status_id, name)) = stage_entry(stage) {
            entry.stages.insert(status_id, name);
        }
    }

    catalog
}

/// Flatten a catalog into a `STATUS_ID -> NAME` lookup
pub fn stage_names(catalog: &StageCatalog) -> HashMap<String, String> {
    catalog
        .values()
        .flat_map(|category| category.stages.clone())
        .collect()
}

/// Status entity id holding the stages of a deal funnel
pub fn deal_stage_entity(category_id: &str) -> String {
    if category_id == "0" {
        DEAL_STAGE.to_string()
    } else {
        format!("{}_{}", DEAL_STAGE, category_id)
    }
}

fn stage_entry(stage: &Record) -> Option<(String, String)> {
    let status_id = field_text(stage, "STATUS_ID").filter(|s| !s.is_empty())?;
    let name = field_text(stage, "NAME").unwrap_or_default();
    Some((status_id, name))
}

fn category_id(record: &Record, field: &str) -> Option<String> {
    field_text(record, field).filter(|s| !s.is_empty())
}
