//! Day enumerator — the dose timeline for one calendar day.
//!
//! Pure: all inputs are pre-fetched, month-scoped lookup structures
//! supplied by the month cache; no I/O happens here and nothing fails.
//! Malformed rows degrade (an unparsable time becomes midnight) so one
//! bad row can never blank the whole day.

use chrono::{NaiveDate, NaiveTime, Timelike};

use crate::models::{IntakeLog, IntakeStatus, Medication};
use crate::recurrence::{applies_to, day_window_ms};

use super::types::{DayCounts, DoseEntry, MonthData};

/// Parse "HH:MM"; malformed input defaults to midnight.
fn parse_time_local(time_local: &str) -> NaiveTime {
    NaiveTime::parse_from_str(time_local.trim(), "%H:%M").unwrap_or(NaiveTime::MIN)
}

fn has_taken_log(
    logs: Option<&Vec<IntakeLog>>,
    schedule_time_id: uuid::Uuid,
    window: (i64, i64),
) -> bool {
    logs.map(|logs| {
        logs.iter().any(|log| {
            log.schedule_time_id == schedule_time_id
                && log.status == IntakeStatus::Taken
                && log.taken_at >= window.0
                && log.taken_at < window.1
        })
    })
    .unwrap_or(false)
}

/// Enumerate the ordered dose timeline for `day`.
///
/// Schedules that do not apply contribute nothing; so do schedules with
/// zero times. Duplicate times on one schedule produce duplicate entries
/// (a data-entry anomaly, deliberately not filtered). Result is sorted
/// ascending by timestamp, ties broken by medication name so grouping is
/// stable for the UI.
pub fn enumerate_day(
    day: NaiveDate,
    medications: &[Medication],
    data: &MonthData,
) -> Vec<DoseEntry> {
    let window = day_window_ms(day);
    let mut entries = Vec::new();

    for medication in medications {
        let Some(schedules) = data.schedules.get(&medication.id) else {
            continue;
        };
        let logs = data.logs.get(&medication.id);

        for schedule in schedules {
            if !applies_to(schedule, day) {
                continue;
            }
            let Some(times) = data.times.get(&schedule.id) else {
                continue;
            };
            for time in times {
                let tod = parse_time_local(&time.time_local);
                let timestamp_ms =
                    window.0 + i64::from(tod.num_seconds_from_midnight()) * 1_000;
                entries.push(DoseEntry {
                    medication_id: medication.id,
                    medication_name: medication.name.clone(),
                    schedule_id: schedule.id,
                    schedule_time_id: time.id,
                    time_label: time.time_local.clone(),
                    timestamp_ms,
                    dosage: time.dosage.clone(),
                    prn: time.prn,
                    taken: has_taken_log(logs, time.id, window),
                });
            }
        }
    }

    entries.sort_by(|a, b| {
        a.timestamp_ms
            .cmp(&b.timestamp_ms)
            .then_with(|| a.medication_name.cmp(&b.medication_name))
    });
    entries
}

/// Compliance counters over a day's entries. PRN doses are flagged in
/// the timeline but excluded from both counts.
pub fn day_counts(entries: &[DoseEntry]) -> DayCounts {
    let mut counts = DayCounts::default();
    for entry in entries.iter().filter(|e| !e.prn) {
        counts.total += 1;
        if entry.taken {
            counts.taken += 1;
        }
    }
    counts
}
