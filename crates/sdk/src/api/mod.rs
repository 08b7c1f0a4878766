//! API groups of the Bitrix24 client.
//!
//! Each group borrows the client and wraps one family of REST methods.

mod activities;
mod crm;
mod stage_history;
mod statuses;
mod tasks;

pub use activities::ActivitiesApi;
pub use crm::{CrmApi, EntityKind};
pub use stage_history::StageHistoryApi;
pub use statuses::{DealStages, StatusesApi};
pub use tasks::TasksApi;

use b24_core::Record;
use serde_json::Value;

/// Keep the object items of a list response.
pub(crate) fn into_records(items: Vec<Value>) -> Vec<Record> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}
