//! CRM items API (deals, leads, contacts, companies).

use super::into_records;
use crate::client::BitrixClient;
use crate::error::{BitrixError, BitrixResult};
use b24_core::Record;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// CRM entity kinds reachable through `crm.<kind>.*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Deal,
    Lead,
    Contact,
    Company,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::Deal, Self::Lead, Self::Contact, Self::Company];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deal => "deal",
            Self::Lead => "lead",
            Self::Contact => "contact",
            Self::Company => "company",
        }
    }

    /// Numeric CRM entity type id.
    pub fn entity_type_id(&self) -> i64 {
        match self {
            Self::Lead => 1,
            Self::Deal => 2,
            Self::Contact => 3,
            Self::Company => 4,
        }
    }

    /// Owner type used by activity and timeline filters.
    pub fn owner_type(&self) -> &'static str {
        match self {
            Self::Deal => "DEAL",
            Self::Lead => "LEAD",
            Self::Contact => "CONTACT",
            Self::Company => "COMPANY",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deal" | "deals" => Ok(Self::Deal),
            "lead" | "leads" => Ok(Self::Lead),
            "contact" | "contacts" => Ok(Self::Contact),
            "company" | "companies" => Ok(Self::Company),
            other => Err(format!(
                "Unknown entity '{}', expected one of: deal, lead, contact, company",
                other
            )),
        }
    }
}

/// CRM API for one entity kind.
pub struct CrmApi<'a> {
    client: &'a BitrixClient,
    kind: EntityKind,
}

impl<'a> CrmApi<'a> {
    pub(crate) fn new(client: &'a BitrixClient, kind: EntityKind) -> Self {
        Self { client, kind }
    }

    fn method(&self, action: &str) -> String {
        format!("crm.{}.{}", self.kind.as_str(), action)
    }

    /// List items matching a filter. An empty `select` returns every
    /// standard and user field.
    pub async fn list(&self, filter: Value, select: &[String]) -> BitrixResult<Vec<Record>> {
        let select: Vec<Value> = if select.is_empty() {
            vec![json!("*"), json!("UF_*")]
        } else {
            select.iter().map(|s| json!(s)).collect()
        };
        let filter = if filter.is_null() { json!({}) } else { filter };

        let params = json!({
            "filter": filter,
            "select": select,
            "order": {"ID": "ASC"},
        });

        let items = self.client.http.list_all(&self.method("list"), &params).await?;
        Ok(into_records(items))
    }

    /// Field descriptors (`crm.<kind>.fields`).
    pub async fn fields(&self) -> BitrixResult<Map<String, Value>> {
        let method = self.method("fields");
        match self.client.http.call(&method, &json!({})).await? {
            Value::Object(map) => Ok(map),
            other => Err(BitrixError::UnexpectedResponse {
                method,
                message: format!("expected field descriptors, got {}", other),
            }),
        }
    }

    /// User field definitions with labels and enumeration lists.
    pub async fn userfields(&self) -> BitrixResult<Vec<Record>> {
        let params = json!({"filter": {"LANG": "ru"}});
        let items = self
            .client
            .http
            .list_all(&self.method("userfield.list"), &params)
            .await?;
        Ok(into_records(items))
    }
}
