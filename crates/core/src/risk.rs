// Deal risk rules
//
// A deal is at risk when its stage has not changed for more than five
// working days, or when nobody touched it (calls, timeline comments, tasks)
// during the last three days.

use crate::datetime::{count_workdays, format_timestamp, parse_bitrix_datetime};
use crate::record::{field_text, Record};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Working days without a stage change before a deal is flagged
pub const STALE_STAGE_WORKDAYS: u32 = 5;

/// Days without any activity before a deal is flagged
pub const ACTIVITY_WINDOW_DAYS: i64 = 3;

/// Activity CRM type id of phone calls
pub const CALL_ACTIVITY_TYPE: &str = "2";

/// Activity on a deal inside the lookback window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivitySummary {
    pub calls: usize,
    pub comments: usize,
    pub tasks: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

impl ActivitySummary {
    pub fn has_activity(&self) -> bool {
        self.calls + self.comments + self.tasks > 0
    }

    /// Remember the latest timestamp seen so far
    pub fn observe(&mut self, raw: Option<String>) {
        if let Some(at) = raw.as_deref().and_then(parse_bitrix_datetime) {
            if self.last_activity.map_or(true, |last| at > last) {
                self.last_activity = Some(at);
            }
        }
    }
}

/// Why a deal is considered at risk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskReason {
    StageStale { workdays: u32, since: DateTime<Utc> },
    NoActivity,
    ActivityStale { days: i64, last: DateTime<Utc> },
}

impl fmt::Display for RiskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageStale { workdays, since } => write!(
                f,
                "Статус не менялся {} рабочих дней (последнее изменение: {})",
                workdays,
                format_timestamp(since)
            ),
            Self::NoActivity => write!(
                f,
                "Отсутствует активность (звонки, комментарии, задачи) более {} дней",
                ACTIVITY_WINDOW_DAYS
            ),
            Self::ActivityStale { days, last } => write!(
                f,
                "Последняя активность была {} дней назад ({})",
                days,
                format_timestamp(last)
            ),
        }
    }
}

/// Whether a task is bound to the deal through `UF_CRM_TASK` (`["D_10"]`)
pub fn task_links_deal(task: &Record, deal_id: &str) -> bool {
    let prefix = format!("D_{}", deal_id);
    let binding = task.get("UF_CRM_TASK").or_else(|| task.get("ufCrmTask"));

    match binding {
        Some(Value::String(s)) => s == &prefix,
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|item| item == prefix),
        _ => false,
    }
}

/// Apply the risk rules to one deal
pub fn assess(deal: &Record, activity: &ActivitySummary, now: DateTime<Utc>) -> Vec<RiskReason> {
    let mut reasons = Vec::new();

    let modified = field_text(deal, "DATE_MODIFY")
        .filter(|s| !s.is_empty())
        .or_else(|| field_text(deal, "DATE_CREATE"));
    if let Some(since) = modified.as_deref().and_then(parse_bitrix_datetime) {
        let workdays = count_workdays(since, now);
        if workdays > STALE_STAGE_WORKDAYS {
            reasons.push(RiskReason::StageStale { workdays, since });
        }
    }

    if !activity.has_activity() {
        reasons.push(RiskReason::NoActivity);
    } else if let Some(last) = activity.last_activity {
        let idle = now - last;
        if idle > Duration::days(ACTIVITY_WINDOW_DAYS) {
            reasons.push(RiskReason::ActivityStale {
                days: idle.num_days(),
                last,
            });
        }
    }

    reasons
}

/// A deal flagged by `assess`
#[derive(Debug, Clone)]
pub struct DealAtRisk {
    pub deal_id: String,
    pub title: String,
    pub stage_id: String,
    pub reasons: Vec<RiskReason>,
    pub activity: ActivitySummary,
}

impl DealAtRisk {
    pub fn new(deal: &Record, reasons: Vec<RiskReason>, activity: ActivitySummary) -> Self {
        let deal_id = field_text(deal, "ID").unwrap_or_default();
        Self {
            title: field_text(deal, "TITLE")
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Сделка #{}", deal_id)),
            stage_id: field_text(deal, "STAGE_ID").unwrap_or_else(|| "Неизвестно".to_string()),
            deal_id,
            reasons,
            activity,
        }
    }
}

/// Render the risk report
pub fn render_risk_report(
    checked: usize,
    at_risk: &[DealAtRisk],
    stage_names: &HashMap<String, String>,
) -> String {
    if at_risk.is_empty() {
        return format!("Сделок в риске не найдено. Проверено сделок: {}.", checked);
    }

    let mut out = String::from("=== Сделки в риске ===\n\n");
    out.push_str(&format!("Всего проверено сделок: {}\n", checked));
    out.push_str(&format!("Сделок в риске: {}\n\n", at_risk.len()));

    for (idx, deal) in at_risk.iter().enumerate() {
        let stage = stage_names.get(&deal.stage_id).unwrap_or(&deal.stage_id);
        out.push_str(&format!("{}. {} (ID: {})\n", idx + 1, deal.title, deal.deal_id));
        out.push_str(&format!("   Стадия: {} ({})\n", stage, deal.stage_id));
        out.push_str("   Причины риска:\n");
        for reason in &deal.reasons {
            out.push_str(&format!("     • {}\n", reason));
        }

        out.push_str(&format!(
            "   Активность за последние {} дня:\n",
            ACTIVITY_WINDOW_DAYS
        ));
        out.push_str(&format!("     • Звонки: {}\n", deal.activity.calls));
        out.push_str(&format!("     • Комментарии: {}\n", deal.activity.comments));
        out.push_str(&format!("     • Задачи: {}\n", deal.activity.tasks));
        if let Some(last) = &deal.activity.last_activity {
            out.push_str(&format!("   Последняя активность: {}\n", format_timestamp(last)));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    // Thursday
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 13, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_task_links_deal() {
        assert!(task_links_deal(&record(json!({"UF_CRM_TASK": ["C_3", "D_10"]})), "10"));
        assert!(task_links_deal(&record(json!({"ufCrmTask": "D_10"})), "10"));
        assert!(!task_links_deal(&record(json!({"UF_CRM_TASK": ["D_100"]})), "10"));
        assert!(!task_links_deal(&record(json!({"UF_CRM_TASK": null})), "10"));
        assert!(!task_links_deal(&record(json!({"TITLE": "x"})), "10"));
    }

    #[test]
    fn test_observe_keeps_latest() {
        let mut summary = ActivitySummary::default();
        summary.observe(Some("2025-11-10T10:00:00+00:00".to_string()));
        summary.observe(Some("2025-11-09T10:00:00+00:00".to_string()));
        summary.observe(Some("garbage".to_string()));
        summary.observe(None);

        assert_eq!(
            summary.last_activity,
            Some(Utc.with_ymd_and_hms(2025, 11, 10, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_stale_stage_and_no_activity() {
        // Monday 2025-11-03 .. Thursday 2025-11-13 = 9 workdays
        let deal = record(json!({"ID": "1", "TITLE": "Old", "DATE_MODIFY": "2025-11-03T09:00:00+00:00"}));
        let reasons = assess(&deal, &ActivitySummary::default(), now());

        assert_eq!(reasons.len(), 2);
        assert!(matches!(reasons[0], RiskReason::StageStale { workdays: 9, .. }));
        assert_eq!(reasons[1], RiskReason::NoActivity);
    }

    #[test]
    fn test_recent_deal_with_activity_is_safe() {
        let deal = record(json!({"ID": "2", "DATE_MODIFY": "2025-11-12T09:00:00+00:00"}));
        let activity = ActivitySummary {
            calls: 1,
            last_activity: Some(Utc.with_ymd_and_hms(2025, 11, 12, 15, 0, 0).unwrap()),
            ..Default::default()
        };

        assert!(assess(&deal, &activity, now()).is_empty());
    }

    #[test]
    fn test_falls_back_to_date_create() {
        let deal = record(json!({"ID": "3", "DATE_MODIFY": "", "DATE_CREATE": "2025-10-01 09:00:00"}));
        let activity = ActivitySummary {
            tasks: 1,
            last_activity: Some(Utc.with_ymd_and_hms(2025, 11, 13, 9, 0, 0).unwrap()),
            ..Default::default()
        };

        let reasons = assess(&deal, &activity, now());
        assert_eq!(reasons.len(), 1);
        assert!(matches!(reasons[0], RiskReason::StageStale { .. }));
    }

    #[test]
    fn test_stale_activity() {
        let deal = record(json!({"ID": "4", "DATE_MODIFY": "2025-11-12T09:00:00+00:00"}));
        let last = Utc.with_ymd_and_hms(2025, 11, 8, 12, 0, 0).unwrap();
        let activity = ActivitySummary {
            comments: 2,
            last_activity: Some(last),
            ..Default::default()
        };

        assert_eq!(
            assess(&deal, &activity, now()),
            vec![RiskReason::ActivityStale { days: 5, last }]
        );
    }

    #[test]
    fn test_render_risk_report() {
        let deal = record(json!({"ID": "1", "STAGE_ID": "NEW"}));
        let flagged = DealAtRisk::new(&deal, vec![RiskReason::NoActivity], ActivitySummary::default());
        let names = HashMap::from([("NEW".to_string(), "Новая".to_string())]);

        let text = render_risk_report(4, &[flagged], &names);
        assert!(text.contains("Всего проверено сделок: 4"));
        assert!(text.contains("1. Сделка #1 (ID: 1)"));
        assert!(text.contains("   Стадия: Новая (NEW)"));
        assert!(text.contains("     • Отсутствует активность (звонки, комментарии, задачи) более 3 дней"));
        assert!(text.contains("     • Звонки: 0"));

        assert_eq!(
            render_risk_report(2, &[], &names),
            "Сделок в риске не найдено. Проверено сделок: 2."
        );
    }
}
