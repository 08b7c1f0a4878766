// Date and duration helpers for Bitrix24 timestamps

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};

const BITRIX_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp as Bitrix24 returns it.
///
/// Accepts ISO-8601 with an offset or `Z` (`2025-06-09T10:00:00+03:00`),
/// ISO-8601 without an offset, the classic `YYYY-MM-DD HH:MM:SS` form and a
/// bare date. Values without an offset are taken as UTC.
pub fn parse_bitrix_datetime(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", BITRIX_FORMAT] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Render a timestamp the way the tools print it
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format(BITRIX_FORMAT).to_string()
}

/// Human-readable duration, e.g. `2 дн 3 ч 15 мин`
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);

    if total < 60 {
        format!("{} сек", total)
    } else if total < 3_600 {
        format!("{} мин {} сек", total / 60, total % 60)
    } else if total < 86_400 {
        format!("{} ч {} мин", total / 3_600, (total % 3_600) / 60)
    } else {
        let days = total / 86_400;
        let hours = (total % 86_400) / 3_600;
        let minutes = (total % 3_600) / 60;
        if hours == 0 {
            format!("{} дн {} мин", days, minutes)
        } else {
            format!("{} дн {} ч {} мин", days, hours, minutes)
        }
    }
}

/// Count Monday to Friday calendar dates between two instants, both ends
/// inclusive.
pub fn count_workdays(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    if start > end {
        return 0;
    }

    start
        .date_naive()
        .iter_days()
        .take_while(|day| *day <= end.date_naive())
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as u32
}

/// Optional date window supplied by a tool caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl DateRange {
    /// Build a range, widening bare dates to the start and end of the day
    pub fn new(from: Option<&str>, to: Option<&str>) -> Self {
        let widen = |value: &str, time: &str| {
            let value = value.trim();
            if value.len() == 10 && !value.contains('T') {
                format!("{}T{}", value, time)
            } else {
                value.to_string()
            }
        };

        Self {
            from: from.filter(|s| !s.trim().is_empty()).map(|s| widen(s, "00:00:00")),
            to: to.filter(|s| !s.trim().is_empty()).map(|s| widen(s, "23:59:59")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// `Период: с X по Y` line, `None` when the range is open on both ends
    pub fn describe(&self) -> Option<String> {
        match (&self.from, &self.to) {
            (Some(from), Some(to)) => Some(format!("Период: с {} по {}", from, to)),
            (Some(from), None) => Some(format!("Период: с {}", from)),
            (None, Some(to)) => Some(format!("Период: до {}", to)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_bitrix_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 9, 7, 0, 0).unwrap();

        assert_eq!(parse_bitrix_datetime("2025-06-09T10:00:00+03:00"), Some(expected));
        assert_eq!(parse_bitrix_datetime("2025-06-09T07:00:00Z"), Some(expected));
        assert_eq!(parse_bitrix_datetime("2025-06-09T07:00:00"), Some(expected));
        assert_eq!(parse_bitrix_datetime("2025-06-09 07:00:00"), Some(expected));
        assert_eq!(
            parse_bitrix_datetime("2025-06-09"),
            Some(Utc.with_ymd_and_hms(2025, 6, 9, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_bitrix_datetime("yesterday"), None);
        assert_eq!(parse_bitrix_datetime(""), None);
    }

    #[test]
    fn test_format_duration_ranges() {
        assert_eq!(format_duration(Duration::seconds(42)), "42 сек");
        assert_eq!(format_duration(Duration::seconds(125)), "2 мин 5 сек");
        assert_eq!(format_duration(Duration::seconds(3 * 3600 + 15 * 60)), "3 ч 15 мин");
        assert_eq!(
            format_duration(Duration::seconds(2 * 86_400 + 3 * 3600 + 60)),
            "2 дн 3 ч 1 мин"
        );
        assert_eq!(format_duration(Duration::seconds(86_400 + 30 * 60)), "1 дн 30 мин");
        assert_eq!(format_duration(Duration::seconds(-5)), "0 сек");
    }

    #[test]
    fn test_count_workdays() {
        // Monday 2025-11-03 .. Monday 2025-11-10
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 18, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 11, 10, 9, 0, 0).unwrap();
        assert_eq!(count_workdays(start, end), 6);

        // Saturday to Sunday
        let sat = Utc.with_ymd_and_hms(2025, 11, 8, 0, 0, 0).unwrap();
        let sun = Utc.with_ymd_and_hms(2025, 11, 9, 0, 0, 0).unwrap();
        assert_eq!(count_workdays(sat, sun), 0);

        assert_eq!(count_workdays(end, start), 0);
    }

    #[test]
    fn test_date_range_widening() {
        let range = DateRange::new(Some("2025-11-01"), Some("2025-11-30"));
        assert_eq!(range.from.as_deref(), Some("2025-11-01T00:00:00"));
        assert_eq!(range.to.as_deref(), Some("2025-11-30T23:59:59"));
        assert_eq!(
            range.describe().as_deref(),
            Some("Период: с 2025-11-01T00:00:00 по 2025-11-30T23:59:59")
        );

        let open = DateRange::new(None, Some("2025-11-30T12:00:00"));
        assert_eq!(open.to.as_deref(), Some("2025-11-30T12:00:00"));
        assert_eq!(open.describe().as_deref(), Some("Период: до 2025-11-30T12:00:00"));

        assert!(DateRange::new(Some(""), None).is_empty());
        assert_eq!(DateRange::default().describe(), None);
    }
}
