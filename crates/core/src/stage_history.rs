// Stage history reconstruction
//
// `crm.stagehistory.list` returns a flat log of stage-change events. This
// module turns it into per-entity intervals (how long each entity stayed in
// each stage) and aggregate statistics across entities.

use crate::datetime::{format_duration, format_timestamp, parse_bitrix_datetime, DateRange};
use crate::record::{field_text, Record};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const UNKNOWN_STAGE: &str = "Неизвестно";

/// CRM entity types that carry a stage history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Lead,
    Deal,
    QuoteOld,
    InvoiceNew,
    Other(i64),
}

impl EntityType {
    pub fn from_id(id: i64) -> Self {
        match id {
            1 => Self::Lead,
            2 => Self::Deal,
            5 => Self::QuoteOld,
            31 => Self::InvoiceNew,
            other => Self::Other(other),
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Self::Lead => 1,
            Self::Deal => 2,
            Self::QuoteOld => 5,
            Self::InvoiceNew => 31,
            Self::Other(id) => *id,
        }
    }

    /// `crm.status.list` entity id holding the stage names
    pub fn status_entity(&self) -> &'static str {
        match self {
            Self::Lead => "LEAD_STATUS",
            Self::Deal | Self::Other(_) => "DEAL_STAGE",
            Self::QuoteOld => "QUOTE_STATUS",
            Self::InvoiceNew => "INVOICE_STATUS",
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Lead => "лид".to_string(),
            Self::Deal => "сделка".to_string(),
            Self::QuoteOld => "счет (старый)".to_string(),
            Self::InvoiceNew => "счет (новый)".to_string(),
            Self::Other(id) => format!("сущность типа {}", id),
        }
    }
}

/// One stage-change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub owner_id: String,
    pub stage_id: String,
    pub type_id: i64,
    pub created_at: DateTime<Utc>,
}

impl StageEvent {
    /// Parse a `crm.stagehistory.list` item. Returns `None` when the event
    /// has no usable `CREATED_TIME`.
    pub fn from_record(record: &Record) -> Option<Self> {
        let created_at = field_text(record, "CREATED_TIME").and_then(|s| parse_bitrix_datetime(&s))?;

        let stage_id = field_text(record, "STAGE_ID")
            .filter(|s| !s.is_empty())
            .or_else(|| field_text(record, "STATUS_ID").filter(|s| !s.is_empty()))
            .unwrap_or_else(|| UNKNOWN_STAGE.to_string());

        Some(Self {
            owner_id: field_text(record, "OWNER_ID").unwrap_or_default(),
            stage_id,
            type_id: field_text(record, "TYPE_ID")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            created_at,
        })
    }

    /// Russian label of the event type
    pub fn type_name(&self) -> String {
        match self.type_id {
            1 => "Создание".to_string(),
            2 => "Переход на промежуточную стадию".to_string(),
            3 => "Переход на финальную стадию".to_string(),
            5 => "Смена воронки".to_string(),
            other => format!("Событие типа {}", other),
        }
    }
}

/// Parse every record, skipping events without a valid timestamp
pub fn parse_events(records: &[Record]) -> Vec<StageEvent> {
    records
        .iter()
        .filter_map(|record| {
            let event = StageEvent::from_record(record);
            if event.is_none() {
                tracing::warn!(
                    record_id = %field_text(record, "ID").unwrap_or_default(),
                    "Skipping stage history event without a valid CREATED_TIME"
                );
            }
            event
        })
        .collect()
}

/// Events of a single entity in chronological order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerHistory {
    pub owner_id: String,
    pub events: Vec<StageEvent>,
}

/// Group events by owner. Owners keep their first-appearance order and each
/// owner's events are sorted by time (stable for equal timestamps).
pub fn group_by_owner(events: Vec<StageEvent>) -> Vec<OwnerHistory> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut histories: Vec<OwnerHistory> = Vec::new();

    for event in events {
        let existing = index.get(&event.owner_id).copied();
        match existing {
            Some(i) => histories[i].events.push(event),
            None => {
                index.insert(event.owner_id.clone(), histories.len());
                histories.push(OwnerHistory {
                    owner_id: event.owner_id.clone(),
                    events: vec![event],
                });
            }
        }
    }

    for history in &mut histories {
        history.events.sort_by_key(|e| e.created_at);
    }

    histories
}

/// Time spent in one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInterval {
    pub event: StageEvent,
    pub duration: Duration,
    /// The entity is still in this stage; the interval ends at "now"
    pub current: bool,
}

/// Each event lasts until the next one; the last lasts until `now`
pub fn build_timeline(events: &[StageEvent], now: DateTime<Utc>) -> Vec<StageInterval> {
    events
        .iter()
        .enumerate()
        .map(|(i, event)| match events.get(i + 1) {
            Some(next) => StageInterval {
                event: event.clone(),
                duration: next.created_at - event.created_at,
                current: false,
            },
            None => StageInterval {
                event: event.clone(),
                duration: now - event.created_at,
                current: true,
            },
        })
        .collect()
}

/// Aggregate time spent in a stage across entities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStats {
    pub stage_id: String,
    pub count: usize,
    pub total: Duration,
    pub average: Duration,
}

/// Aggregate closed intervals per stage. The current stage of each entity is
/// excluded because its duration is still growing. Sorted by average time,
/// longest first.
pub fn aggregate(histories: &[OwnerHistory]) -> Vec<StageStats> {
    let mut order: Vec<String> = Vec::new();
    let mut durations: HashMap<String, Vec<Duration>> = HashMap::new();

    for history in histories {
        for pair in history.events.windows(2) {
            let stage_id = &pair[0].stage_id;
            if !durations.contains_key(stage_id) {
                order.push(stage_id.clone());
            }
            durations
                .entry(stage_id.clone())
                .or_default()
                .push(pair[1].created_at - pair[0].created_at);
        }
    }

    let mut stats: Vec<StageStats> = order
        .into_iter()
        .map(|stage_id| {
            let times = durations.remove(&stage_id).unwrap_or_default();
            let total = times.iter().fold(Duration::zero(), |acc, d| acc + *d);
            let average = Duration::milliseconds(total.num_milliseconds() / times.len().max(1) as i64);
            StageStats {
                stage_id,
                count: times.len(),
                total,
                average,
            }
        })
        .collect();

    stats.sort_by(|a, b| b.average.cmp(&a.average));
    stats
}

/// Inputs shared by the text renderers
pub struct HistoryContext<'a> {
    pub entity: EntityType,
    pub range: &'a DateRange,
    pub stage_names: &'a HashMap<String, String>,
}

impl HistoryContext<'_> {
    fn stage_name<'s>(&'s self, stage_id: &'s str) -> &'s str {
        self.stage_names.get(stage_id).map(String::as_str).unwrap_or(stage_id)
    }

    fn push_period(&self, out: &mut String) {
        if let Some(period) = self.range.describe() {
            out.push_str(&period);
            out.push_str("\n\n");
        }
    }
}

/// Message returned when the API has no events for the query
pub fn render_not_found(entity: EntityType, owner_id: Option<i64>) -> String {
    match owner_id {
        Some(id) => format!(
            "История стадий для {} с ID {} не найдена.",
            entity.display_name(),
            id
        ),
        None => format!("История стадий для {} не найдена.", entity.display_name()),
    }
}

/// Detailed per-entity history
pub fn render_owner_history(ctx: &HistoryContext<'_>, histories: &[OwnerHistory], now: DateTime<Utc>) -> String {
    let mut out = String::new();

    for history in histories {
        out.push_str(&format!(
            "\n=== История стадий для {} ID: {} ===\n\n",
            ctx.entity.display_name(),
            history.owner_id
        ));
        ctx.push_period(&mut out);

        if let [only] = history.events.as_slice() {
            out.push_str(&format!("Создан: {}\n", format_timestamp(&only.created_at)));
            out.push_str(&format!(
                "Текущая стадия: {} ({})\n",
                ctx.stage_name(&only.stage_id),
                only.stage_id
            ));
            out.push_str("Время на текущей стадии: рассчитывается от момента создания\n");
            continue;
        }

        let mut total = Duration::zero();
        for (i, interval) in build_timeline(&history.events, now).iter().enumerate() {
            total += interval.duration;
            let mut time = format_duration(interval.duration);
            if interval.current {
                time.push_str(" (текущая стадия)");
            }

            out.push_str(&format!("{}. {}\n", i + 1, interval.event.type_name()));
            out.push_str(&format!(
                "   Стадия: {} ({})\n",
                ctx.stage_name(&interval.event.stage_id),
                interval.event.stage_id
            ));
            out.push_str(&format!(
                "   Дата/время: {}\n",
                format_timestamp(&interval.event.created_at)
            ));
            out.push_str(&format!("   Время на стадии: {}\n\n", time));
        }

        out.push_str(&format!("Общее время в стадиях: {}\n", format_duration(total)));
    }

    out
}

/// Average time per stage across all entities
pub fn render_aggregate(ctx: &HistoryContext<'_>, histories: &[OwnerHistory]) -> String {
    let mut out = format!(
        "=== Статистика по стадиям для {} ===\n\n",
        ctx.entity.display_name()
    );
    ctx.push_period(&mut out);
    out.push_str(&format!("Всего сущностей: {}\n\n", histories.len()));

    let stats = aggregate(histories);
    if stats.is_empty() {
        out.push_str(
            "Недостаточно данных для расчета статистики (все сущности находятся в текущей стадии).\n",
        );
        return out;
    }

    out.push_str("Среднее время нахождения в стадиях:\n\n");
    for stat in &stats {
        out.push_str(&format!("• {} ({})\n", ctx.stage_name(&stat.stage_id), stat.stage_id));
        out.push_str(&format!("  Среднее время: {}\n", format_duration(stat.average)));
        out.push_str(&format!("  Количество переходов: {}\n", stat.count));
        out.push_str(&format!("  Общее время: {}\n\n", format_duration(stat.total)));
    }

    out
}
