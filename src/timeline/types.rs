use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{IntakeLog, Schedule, ScheduleTime};
use crate::recurrence::start_of_day_ms;

/// One row of the dose timeline for a single day. Derived, never
/// persisted — recomputed on every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseEntry {
    pub medication_id: Uuid,
    pub medication_name: String,
    pub schedule_id: Uuid,
    pub schedule_time_id: Uuid,
    /// Raw "HH:MM" label as stored, shown in the UI.
    pub time_label: String,
    /// Absolute epoch-ms instant of this dose on its day.
    pub timestamp_ms: i64,
    pub dosage: String,
    pub prn: bool,
    pub taken: bool,
}

/// Per-day compliance counters. PRN entries are excluded from both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCounts {
    pub taken: u32,
    pub total: u32,
}

/// A day's counters with its date, for the week strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day: NaiveDate,
    pub taken: u32,
    pub total: u32,
}

/// (year, month) cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(day: NaiveDate) -> Self {
        Self {
            year: day.year(),
            month: day.month(),
        }
    }

    /// First day of the month.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// First day of the following month.
    pub fn next_first_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
    }

    /// `[month_start, next_month_start)` epoch-ms bounds.
    pub fn range_ms(&self) -> (i64, i64) {
        (
            start_of_day_ms(self.first_day()),
            start_of_day_ms(self.next_first_day()),
        )
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// The month-scoped lookup structures the day enumerator works from:
/// medication → schedules, schedule → times, medication → intake logs
/// (logs restricted to the month's window). Filled by the month cache.
#[derive(Debug, Clone, Default)]
pub struct MonthData {
    pub schedules: HashMap<Uuid, Vec<Schedule>>,
    pub times: HashMap<Uuid, Vec<ScheduleTime>>,
    pub logs: HashMap<Uuid, Vec<IntakeLog>>,
}

impl MonthData {
    pub fn clear(&mut self) {
        self.schedules.clear();
        self.times.clear();
        self.logs.clear();
    }
}
