//! Relative and absolute time expressions.
//!
//! Every recognised expression becomes a half-open `[start, end)` window
//! computed from the caller's `now`. Weeks start on Monday. Anything that
//! would overflow the calendar is dropped rather than clamped.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use regex::Regex;

use crate::predicate::Predicate;

static CALENDAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(today|yesterday|(?:this|last|previous) (?:week|month|year))\b").unwrap()
});

static ROLLING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:last|past|previous)\s+(\d{1,5})\s+(hour|day|week|month|year)s?\b").unwrap()
});

static PAST_UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpast (hour|day|week|month|year)\b").unwrap());

static SPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:from|between)\s+(\d{4}-\d{2}-\d{2})\s+(?:to|and|until|through|thru)\s+(\d{4}-\d{2}-\d{2})\b",
    )
    .unwrap()
});

static SINCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsince\s+(\d{4}-\d{2}-\d{2})\b").unwrap());

static ON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bon\s+(\d{4}-\d{2}-\d{2})\b").unwrap());

/// Find every time expression in lowercased `text`, keyed by byte offset.
pub fn find_time_ranges(text: &str, now: DateTime<Utc>, field: &str) -> Vec<(usize, Predicate)> {
    let mut found = Vec::new();
    let mut push = |pos: usize, window: Option<(DateTime<Utc>, DateTime<Utc>)>| {
        if let Some((start, end)) = window {
            if start < end {
                found.push((
                    pos,
                    Predicate::TimeRange {
                        field: field.to_string(),
                        start,
                        end,
                    },
                ));
            }
        }
    };

    for caps in CALENDAR_RE.captures_iter(text) {
        let m = caps.get(0).map_or(0, |m| m.start());
        push(m, calendar_window(&caps[1], now));
    }

    for caps in ROLLING_RE.captures_iter(text) {
        let m = caps.get(0).map_or(0, |m| m.start());
        let window = caps[1]
            .parse::<u32>()
            .ok()
            .and_then(|n| rolling_window(n, &caps[2], now));
        push(m, window);
    }

    for caps in PAST_UNIT_RE.captures_iter(text) {
        let m = caps.get(0).map_or(0, |m| m.start());
        push(m, rolling_window(1, &caps[1], now));
    }

    for caps in SPAN_RE.captures_iter(text) {
        let m = caps.get(0).map_or(0, |m| m.start());
        let window = parse_date(&caps[1]).zip(parse_date(&caps[2])).and_then(
            |(from, to)| {
                let (from, to) = if from <= to { (from, to) } else { (to, from) };
                Some((midnight(from)?, midnight(to.succ_opt()?)?))
            },
        );
        push(m, window);
    }

    for caps in SINCE_RE.captures_iter(text) {
        let m = caps.get(0).map_or(0, |m| m.start());
        let window = parse_date(&caps[1])
            .and_then(midnight)
            .map(|start| (start, now));
        push(m, window);
    }

    for caps in ON_RE.captures_iter(text) {
        let m = caps.get(0).map_or(0, |m| m.start());
        let window = parse_date(&caps[1]).and_then(day_window);
        push(m, window);
    }

    found
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn day_window(date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    Some((midnight(date)?, midnight(date.succ_opt()?)?))
}

fn week_start(date: NaiveDate) -> Option<NaiveDate> {
    let offset = i64::from(date.weekday().num_days_from_monday());
    date.checked_sub_signed(Duration::days(offset))
}

fn month_start(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

fn year_start(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), 1, 1)
}

fn calendar_window(phrase: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let today = now.date_naive();
    let (start, end) = match phrase {
        "today" => (today, today.succ_opt()?),
        "yesterday" => (today.pred_opt()?, today),
        "this week" => {
            let start = week_start(today)?;
            (start, start.checked_add_signed(Duration::days(7))?)
        }
        "last week" | "previous week" => {
            let end = week_start(today)?;
            (end.checked_sub_signed(Duration::days(7))?, end)
        }
        "this month" => {
            let start = month_start(today)?;
            (start, start.checked_add_months(Months::new(1))?)
        }
        "last month" | "previous month" => {
            let end = month_start(today)?;
            (end.checked_sub_months(Months::new(1))?, end)
        }
        "this year" => {
            let start = year_start(today)?;
            (start, start.checked_add_months(Months::new(12))?)
        }
        "last year" | "previous year" => {
            let end = year_start(today)?;
            (end.checked_sub_months(Months::new(12))?, end)
        }
        _ => return None,
    };
    Some((midnight(start)?, midnight(end)?))
}

fn rolling_window(
    amount: u32,
    unit: &str,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if amount == 0 {
        return None;
    }
    let start = match unit {
        "hour" => now.checked_sub_signed(Duration::hours(i64::from(amount)))?,
        "day" => now.checked_sub_signed(Duration::days(i64::from(amount)))?,
        "week" => now.checked_sub_signed(Duration::weeks(i64::from(amount)))?,
        "month" => now.checked_sub_months(Months::new(amount))?,
        "year" => now.checked_sub_months(Months::new(amount.checked_mul(12)?))?,
        _ => return None,
    };
    Some((start, now))
}

/// Convert a `days_back` count into a window ending at `now`.
pub fn days_back_window(days: u32, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    rolling_window(days, "day", now)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Wednesday
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 14, 30, 0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn only_window(text: &str) -> (DateTime<Utc>, DateTime<Utc>) {
        let found = find_time_ranges(text, now(), "created_at");
        assert_eq!(found.len(), 1, "expected one window in {text:?}: {found:?}");
        match &found[0].1 {
            Predicate::TimeRange { start, end, .. } => (*start, *end),
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn test_today_and_yesterday() {
        assert_eq!(only_window("orders today"), (at(2024, 5, 15), at(2024, 5, 16)));
        assert_eq!(
            only_window("revenue yesterday"),
            (at(2024, 5, 14), at(2024, 5, 15))
        );
    }

    #[test]
    fn test_weeks_start_monday() {
        assert_eq!(
            only_window("sales this week"),
            (at(2024, 5, 13), at(2024, 5, 20))
        );
        assert_eq!(
            only_window("sales last week"),
            (at(2024, 5, 6), at(2024, 5, 13))
        );
    }

    #[test]
    fn test_calendar_months_and_years() {
        assert_eq!(
            only_window("revenue last month"),
            (at(2024, 4, 1), at(2024, 5, 1))
        );
        assert_eq!(
            only_window("revenue this month"),
            (at(2024, 5, 1), at(2024, 6, 1))
        );
        assert_eq!(
            only_window("orders last year"),
            (at(2023, 1, 1), at(2024, 1, 1))
        );
    }

    #[test]
    fn test_rolling_windows_end_at_now() {
        let (start, end) = only_window("orders in the last 7 days");
        assert_eq!(end, now());
        assert_eq!(start, now() - Duration::days(7));

        let (start, _) = only_window("past 3 months");
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 15, 14, 30, 0).unwrap());
    }

    #[test]
    fn test_explicit_span_end_is_inclusive() {
        assert_eq!(
            only_window("orders from 2024-01-01 to 2024-01-31"),
            (at(2024, 1, 1), at(2024, 2, 1))
        );
    }

    #[test]
    fn test_since_and_on() {
        assert_eq!(only_window("since 2024-03-01"), (at(2024, 3, 1), now()));
        assert_eq!(only_window("on 2024-02-29"), (at(2024, 2, 29), at(2024, 3, 1)));
    }

    #[test]
    fn test_invalid_dates_are_ignored() {
        assert!(find_time_ranges("on 2024-02-30", now(), "created_at").is_empty());
        assert!(find_time_ranges("last 0 days", now(), "created_at").is_empty());
    }
}
