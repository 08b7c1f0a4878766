// Aggregation over exported CRM records
//
// Filters a record set with a `Condition`, optionally groups it by one or
// more fields and reduces every group with count/sum/avg/min/max.

use crate::condition::{Condition, ConditionError};
use crate::record::{display_value, field_number, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Errors raised by export analysis
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no record list found in {0}")]
    NoRecords(PathBuf),

    #[error("operation '{0}' requires at least one field")]
    MissingFields(Operation),

    #[error("unknown operation '{0}', expected one of: count, sum, avg, min, max")]
    UnknownOperation(String),

    #[error("invalid condition: {0}")]
    Condition(#[from] ConditionError),
}

/// Reduction applied to each group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            "avg" | "average" | "mean" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            _ => Err(AnalysisError::UnknownOperation(s.to_string())),
        }
    }
}

/// What to compute over a record set
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub operation: Operation,
    pub fields: Vec<String>,
    pub condition: Option<Condition>,
    pub group_by: Vec<String>,
}

impl AnalysisRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            fields: Vec::new(),
            condition: None,
            group_by: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_group_by(mut self, group_by: Vec<String>) -> Self {
        self.group_by = group_by;
        self
    }
}

/// Result of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResult {
    pub group: Map<String, Value>,
    pub values: Map<String, Value>,
}

/// Either a single reduction or one per group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    Grouped(Vec<GroupResult>),
    Single(Map<String, Value>),
}

/// Full analysis output, serialized as the tool response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub operation: Operation,
    pub total_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
    pub result: AnalysisResult,
}

/// Run an analysis over in-memory records
pub fn analyze(records: &[Record], request: &AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
    if request.operation != Operation::Count && request.fields.is_empty() {
        return Err(AnalysisError::MissingFields(request.operation));
    }

    let filtered: Vec<&Record> = records
        .iter()
        .filter(|r| request.condition.as_ref().map_or(true, |c| c.matches(r)))
        .collect();

    tracing::debug!(
        operation = %request.operation,
        total = records.len(),
        matched = filtered.len(),
        "Analyzing records"
    );

    let result = if request.group_by.is_empty() {
        AnalysisResult::Single(reduce(&filtered, request))
    } else {
        // Vec keeps groups in first-appearance order
        let mut groups: Vec<(Vec<Value>, Vec<&Record>)> = Vec::new();
        for &record in &filtered {
            let key: Vec<Value> = request
                .group_by
                .iter()
                .map(|field| record.get(field).cloned().unwrap_or(Value::Null))
                .collect();

            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(record),
                None => groups.push((key, vec![record])),
            }
        }

        AnalysisResult::Grouped(
            groups
                .into_iter()
                .map(|(key, members)| GroupResult {
                    group: request.group_by.iter().cloned().zip(key).collect(),
                    values: reduce(&members, request),
                })
                .collect(),
        )
    };

    Ok(AnalysisReport {
        operation: request.operation,
        total_records: filtered.len(),
        group_by: (!request.group_by.is_empty()).then(|| request.group_by.clone()),
        result,
    })
}

fn reduce(records: &[&Record], request: &AnalysisRequest) -> Map<String, Value> {
    let mut values = Map::new();

    if request.operation == Operation::Count {
        values.insert("count".to_string(), Value::from(records.len()));
        return values;
    }

    for field in &request.fields {
        let numbers: Vec<f64> = records.iter().filter_map(|r| field_number(r, field)).collect();

        let reduced: Option<f64> = if numbers.is_empty() {
            None
        } else {
            match request.operation {
                Operation::Sum => Some(numbers.iter().sum()),
                Operation::Avg => Some(numbers.iter().sum::<f64>() / numbers.len() as f64),
                Operation::Min => numbers.iter().copied().reduce(f64::min),
                Operation::Max => numbers.iter().copied().reduce(f64::max),
                Operation::Count => unreachable!(),
            }
        };

        values.insert(field.clone(), reduced.map_or(Value::Null, number_value));
    }

    values
}

/// Integral results serialize without a trailing `.0`
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Load records from an export file.
///
/// The file holds either a bare array of records or an object carrying the
/// array under `records`, `items`, `result` or `data`.
pub fn load_export(path: impl AsRef<Path>) -> Result<Vec<Record>, AnalysisError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AnalysisError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|source| AnalysisError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })?;

    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => ["records", "items", "result", "data"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| AnalysisError::NoRecords(path.to_path_buf()))?,
        _ => return Err(AnalysisError::NoRecords(path.to_path_buf())),
    };

    let total = items.len();
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    if records.len() != total {
        tracing::warn!(
            path = %path.display(),
            skipped = total - records.len(),
            "Skipped non-object entries in export file"
        );
    }

    tracing::info!(path = %path.display(), records = records.len(), "Loaded export file");
    Ok(records)
}

/// Human-readable rendering of a report
pub fn render_report(report: &AnalysisReport) -> String {
    let mut out = String::new();
    out.push_str("Результат анализа:\n");
    out.push_str(&format!("Операция: {}\n", report.operation));
    out.push_str(&format!(
        "Всего записей после фильтрации: {}\n",
        report.total_records
    ));

    let mut multi_field = false;
    match &report.result {
        AnalysisResult::Single(values) => {
            out.push_str("\nРезультат:\n");
            push_values(&mut out, values, "  ");
            multi_field = values.len() > 1;
        }
        AnalysisResult::Grouped(groups) => {
            if let Some(group_by) = &report.group_by {
                out.push_str(&format!("\nГруппировка по полям: {}\n", group_by.join(", ")));
            }
            out.push_str("\nРезультаты по группам:\n");
            for group in groups {
                let label = group
                    .group
                    .iter()
                    .map(|(field, value)| format!("{}={}", field, display_value(value)))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push_str(&format!("\n  Группа: {}\n", label));
                push_values(&mut out, &group.values, "    ");
            }
        }
    }

    if report.group_by.is_some() || multi_field {
        out.push_str(&format!("\n{}\n", "-".repeat(80)));
        out.push_str("Полный результат (JSON):\n");
        out.push_str(&serde_json::to_string_pretty(report).unwrap_or_default());
        out.push('\n');
    }

    out
}

fn push_values(out: &mut String, values: &Map<String, Value>, indent: &str) {
    if let Some(count) = values.get("count") {
        out.push_str(&format!("{}Количество: {}\n", indent, count));
        return;
    }
    for (field, value) in values {
        if !value.is_null() {
            out.push_str(&format!("{}{}: {}\n", indent, field, value));
        }
    }
}
