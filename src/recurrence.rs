//! Recurrence model — does a schedule apply to a given calendar day?
//!
//! Pure, total functions with no I/O. The engine runs on the profile's
//! wall clock: naive local datetimes project to epoch milliseconds
//! through UTC, and the schedule's `timezone` column stays reserved.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

use crate::models::Schedule;

/// ISO Monday-first 3-letter weekday codes.
pub const WEEKDAY_CODES: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// The 3-letter code for a calendar day.
pub fn weekday_code(day: NaiveDate) -> &'static str {
    WEEKDAY_CODES[day.weekday().num_days_from_monday() as usize]
}

/// Epoch ms of a day's midnight.
pub fn start_of_day_ms(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// `[midnight, midnight + 24h)` window of a day, epoch ms.
pub fn day_window_ms(day: NaiveDate) -> (i64, i64) {
    let start = start_of_day_ms(day);
    (start, start + 24 * 60 * 60 * 1_000)
}

/// The calendar day an epoch-ms instant falls on.
pub fn date_of_ms(ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Whether a schedule produces doses on `day`.
///
/// False before the start date's day; false after the (inclusive) end
/// date's day when bounded; false when a non-empty weekday filter does
/// not contain the day's code. Comparison is case-insensitive; unknown
/// codes in the filter never match, so malformed entries are ignored.
pub fn applies_to(schedule: &Schedule, day: NaiveDate) -> bool {
    if day < date_of_ms(schedule.start_date) {
        return false;
    }
    if let Some(end_ms) = schedule.end_date {
        if day > date_of_ms(end_ms) {
            return false;
        }
    }
    if !schedule.days_of_week.is_empty() {
        let code = weekday_code(day);
        if !schedule
            .days_of_week
            .iter()
            .any(|d| d.eq_ignore_ascii_case(code))
        {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Recurrence;
    use uuid::Uuid;

    fn schedule(start: NaiveDate, end: Option<NaiveDate>, days: &[&str]) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            medication_id: Uuid::new_v4(),
            recurrence: Recurrence::Daily,
            frequency_per_day: 1,
            is_forever: end.is_none(),
            start_date: start_of_day_ms(start),
            end_date: end.map(start_of_day_ms),
            days_of_week: days.iter().map(|s| s.to_string()).collect(),
            timezone: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekday_codes_are_monday_first() {
        // 2025-06-02 is a Monday.
        assert_eq!(weekday_code(date(2025, 6, 2)), "MON");
        assert_eq!(weekday_code(date(2025, 6, 8)), "SUN");
    }

    #[test]
    fn day_window_spans_24_hours() {
        let (start, end) = day_window_ms(date(2025, 6, 2));
        assert_eq!(end - start, 86_400_000);
        assert_eq!(date_of_ms(start), date(2025, 6, 2));
        assert_eq!(date_of_ms(end - 1), date(2025, 6, 2));
        assert_eq!(date_of_ms(end), date(2025, 6, 3));
    }

    #[test]
    fn not_applicable_before_start() {
        let s = schedule(date(2025, 6, 2), None, &[]);
        assert!(!applies_to(&s, date(2025, 6, 1)));
        assert!(applies_to(&s, date(2025, 6, 2)));
    }

    #[test]
    fn end_date_is_inclusive() {
        let s = schedule(date(2025, 6, 2), Some(date(2025, 6, 8)), &[]);
        assert!(applies_to(&s, date(2025, 6, 8)));
        assert!(!applies_to(&s, date(2025, 6, 9)));
    }

    #[test]
    fn forever_schedule_applies_far_in_future() {
        let s = schedule(date(2025, 6, 2), None, &[]);
        assert!(applies_to(&s, date(2030, 1, 1)));
    }

    #[test]
    fn weekday_filter_restricts_days() {
        // Monday start, Mon/Wed/Fri filter over one week.
        let s = schedule(date(2025, 6, 2), Some(date(2025, 6, 8)), &["MON", "WED", "FRI"]);
        let expected = [true, false, true, false, true, false, false];
        for (offset, want) in expected.iter().enumerate() {
            let day = date(2025, 6, 2) + chrono::Duration::days(offset as i64);
            assert_eq!(applies_to(&s, day), *want, "offset {offset}");
        }
    }

    #[test]
    fn weekday_filter_is_case_insensitive() {
        let s = schedule(date(2025, 6, 2), None, &["mon"]);
        assert!(applies_to(&s, date(2025, 6, 2)));
        assert!(!applies_to(&s, date(2025, 6, 3)));
    }

    #[test]
    fn unknown_codes_never_match() {
        let s = schedule(date(2025, 6, 2), None, &["XYZ", "MONDAY"]);
        for offset in 0..7 {
            assert!(!applies_to(&s, date(2025, 6, 2) + chrono::Duration::days(offset)));
        }
    }

    #[test]
    fn empty_filter_means_every_day() {
        let s = schedule(date(2025, 6, 2), None, &[]);
        for offset in 0..7 {
            assert!(applies_to(&s, date(2025, 6, 2) + chrono::Duration::days(offset)));
        }
    }

    #[test]
    fn mid_day_start_timestamp_still_applies_that_day() {
        // Schedule created at 15:30 on its start day still covers that day.
        let mut s = schedule(date(2025, 6, 2), None, &[]);
        s.start_date += 15 * 3_600_000 + 30 * 60_000;
        assert!(applies_to(&s, date(2025, 6, 2)));
        assert!(!applies_to(&s, date(2025, 6, 1)));
    }
}
