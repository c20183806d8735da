//! Month cache — amortizes day enumeration across a month of calendar views.
//!
//! Holds the schedules, times and (month-windowed) intake logs needed to
//! enumerate any day of one month, keyed by (year, month). Any schedule
//! or medication mutation invalidates wholesale: cross-month effects
//! (extending an end date) make targeted invalidation unsafe to guess at,
//! and refetching is O(medications) per month.
//!
//! Concurrency: a flight gate makes same-month fetches single-flight —
//! a second caller awaits the first fetch instead of issuing its own.
//! A generation counter guards commits: a fetch that was invalidated
//! while in flight discards its result and refetches rather than
//! overwriting newer state.

use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::Connection;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::types::{MonthData, MonthKey};
use crate::db::{self, DatabaseError};
use crate::models::{IntakeLog, IntakeStatus, Medication};

/// The engine's shared SQLite handle.
pub type SharedConnection = Arc<Mutex<Connection>>;

#[derive(Default)]
struct MonthState {
    key: Option<MonthKey>,
    data: MonthData,
    generation: u64,
}

pub struct MonthCache {
    state: Mutex<MonthState>,
    /// Serialises fetches; held only while a fetch is in flight.
    flight: Mutex<()>,
}

impl MonthCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonthState::default()),
            flight: Mutex::new(()),
        }
    }

    /// The currently cached month, if any.
    pub async fn current_key(&self) -> Option<MonthKey> {
        self.state.lock().await.key
    }

    /// Make sure `day`'s month is cached, refetching from the gateway on
    /// a key change. Returns whether this call performed a fetch.
    ///
    /// On fetch failure the cache is left cleared with no key, so a
    /// retry re-fetches instead of serving stale data as current.
    pub async fn ensure(
        &self,
        conn: &SharedConnection,
        medications: &[Medication],
        day: NaiveDate,
    ) -> Result<bool, DatabaseError> {
        let key = MonthKey::of(day);
        loop {
            {
                let state = self.state.lock().await;
                if state.key == Some(key) {
                    return Ok(false);
                }
            }

            let _flight = self.flight.lock().await;
            let generation = {
                let state = self.state.lock().await;
                if state.key == Some(key) {
                    // Another caller's fetch landed while we waited.
                    return Ok(false);
                }
                state.generation
            };

            let result = fetch_month(conn, medications, key).await;

            let mut state = self.state.lock().await;
            match result {
                Ok(data) => {
                    if state.generation == generation {
                        state.key = Some(key);
                        state.data = data;
                        return Ok(true);
                    }
                    // Invalidated while fetching — result may be stale.
                    tracing::debug!(month = %key, "month fetch superseded, refetching");
                }
                Err(e) => {
                    state.key = None;
                    state.data.clear();
                    return Err(e);
                }
            }
        }
    }

    /// Force the next `ensure` to refetch, whatever month it targets.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.key = None;
        state.data.clear();
        state.generation += 1;
    }

    /// Read access to the cached month data.
    pub async fn with_data<R>(&self, f: impl FnOnce(&MonthData) -> R) -> R {
        let state = self.state.lock().await;
        f(&state.data)
    }

    /// Append a synthetic intake log so a same-session re-enumeration
    /// reflects a just-marked dose without a refetch.
    pub async fn append_log(&self, medication_id: Uuid, log: IntakeLog) {
        let mut state = self.state.lock().await;
        state.data.logs.entry(medication_id).or_default().push(log);
    }

    /// Whether the cached month already holds a counted "taken" log for
    /// this schedule time inside `[window_start, window_end)`.
    pub async fn has_taken_log(
        &self,
        schedule_time_id: Uuid,
        window_start: i64,
        window_end: i64,
    ) -> bool {
        let state = self.state.lock().await;
        state.data.logs.values().any(|logs| {
            logs.iter().any(|log| {
                log.schedule_time_id == schedule_time_id
                    && log.status == IntakeStatus::Taken
                    && log.taken_at >= window_start
                    && log.taken_at < window_end
            })
        })
    }
}

impl Default for MonthCache {
    fn default() -> Self {
        Self::new()
    }
}

/// One schedule query + N time queries + one log range query per
/// medication. Holds the connection for the whole fetch.
async fn fetch_month(
    conn: &SharedConnection,
    medications: &[Medication],
    key: MonthKey,
) -> Result<MonthData, DatabaseError> {
    let (from_ms, to_ms) = key.range_ms();
    let conn = conn.lock().await;
    let mut data = MonthData::default();

    for medication in medications {
        let schedules = db::list_schedules_for_medication(&conn, &medication.id)?;
        for schedule in &schedules {
            let times = db::list_times_for_schedule(&conn, &schedule.id)?;
            data.times.insert(schedule.id, times);
        }
        let logs = db::list_intake_logs(&conn, &medication.id, from_ms, to_ms)?;
        data.schedules.insert(medication.id, schedules);
        data.logs.insert(medication.id, logs);
    }

    tracing::debug!(
        month = %key,
        medications = medications.len(),
        "month cache filled"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::models::*;
    use crate::recurrence::start_of_day_ms;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn shared_conn() -> SharedConnection {
        Arc::new(Mutex::new(open_memory_database().unwrap()))
    }

    async fn seed_medication(conn: &SharedConnection, name: &str) -> (Medication, Schedule, ScheduleTime) {
        let conn = conn.lock().await;
        let ctx = OwnerContext::new("user-1", "profile-a");
        let med = db::create_medication(
            &conn,
            &ctx,
            &MedicationDraft { name: name.into(), notes: None },
            1_000,
        )
        .unwrap();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            medication_id: med.id,
            recurrence: Recurrence::Daily,
            frequency_per_day: 1,
            is_forever: true,
            start_date: start_of_day_ms(date(2025, 1, 1)),
            end_date: None,
            days_of_week: vec![],
            timezone: None,
        };
        db::create_schedule(&conn, &schedule).unwrap();
        let time = ScheduleTime {
            id: Uuid::new_v4(),
            schedule_id: schedule.id,
            time_local: "08:00".into(),
            dosage: "1 tablet".into(),
            dose_amount: None,
            dose_unit: None,
            instructions: None,
            prn: false,
            sort_order: 0,
        };
        db::create_schedule_time(&conn, &time).unwrap();
        (med, schedule, time)
    }

    #[tokio::test]
    async fn ensure_fetches_once_per_month() {
        let conn = shared_conn();
        let (med, ..) = seed_medication(&conn, "Metformin").await;
        let cache = MonthCache::new();
        let meds = vec![med];

        let first = cache.ensure(&conn, &meds, date(2025, 6, 10)).await.unwrap();
        let second = cache.ensure(&conn, &meds, date(2025, 6, 25)).await.unwrap();
        assert!(first);
        assert!(!second, "same month must not refetch");
        assert_eq!(cache.current_key().await, Some(MonthKey { year: 2025, month: 6 }));
    }

    #[tokio::test]
    async fn month_change_refetches() {
        let conn = shared_conn();
        let (med, ..) = seed_medication(&conn, "Metformin").await;
        let cache = MonthCache::new();
        let meds = vec![med];

        assert!(cache.ensure(&conn, &meds, date(2025, 6, 10)).await.unwrap());
        assert!(cache.ensure(&conn, &meds, date(2025, 7, 1)).await.unwrap());
        assert_eq!(cache.current_key().await, Some(MonthKey { year: 2025, month: 7 }));
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let conn = shared_conn();
        let (med, ..) = seed_medication(&conn, "Metformin").await;
        let cache = MonthCache::new();
        let meds = vec![med];

        assert!(cache.ensure(&conn, &meds, date(2025, 6, 10)).await.unwrap());
        cache.invalidate().await;
        assert_eq!(cache.current_key().await, None);
        assert!(cache.ensure(&conn, &meds, date(2025, 6, 10)).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_same_month_requests_share_one_fetch() {
        let conn = shared_conn();
        let (med, ..) = seed_medication(&conn, "Metformin").await;
        let cache = MonthCache::new();
        let meds = vec![med];

        let day = date(2025, 6, 10);
        let (a, b) = tokio::join!(
            cache.ensure(&conn, &meds, day),
            cache.ensure(&conn, &meds, day),
        );
        let fetches = [a.unwrap(), b.unwrap()].iter().filter(|f| **f).count();
        assert_eq!(fetches, 1, "exactly one of the concurrent calls fetches");
    }

    #[tokio::test]
    async fn fetch_loads_schedules_times_and_windowed_logs() {
        let conn = shared_conn();
        let (med, schedule, time) = seed_medication(&conn, "Metformin").await;
        {
            let guard = conn.lock().await;
            let in_june = IntakeLog {
                id: Uuid::new_v4(),
                schedule_time_id: time.id,
                taken_at: start_of_day_ms(date(2025, 6, 10)) + 1_000,
                status: IntakeStatus::Taken,
                actual_amount: None,
                actual_unit: None,
                notes: None,
            };
            let in_may = IntakeLog {
                id: Uuid::new_v4(),
                taken_at: start_of_day_ms(date(2025, 5, 31)) + 1_000,
                ..in_june.clone()
            };
            db::record_intake(&guard, &in_june).unwrap();
            db::record_intake(&guard, &in_may).unwrap();
        }

        let cache = MonthCache::new();
        let meds = vec![med.clone()];
        cache.ensure(&conn, &meds, date(2025, 6, 1)).await.unwrap();

        cache
            .with_data(|data| {
                assert_eq!(data.schedules.get(&med.id).map(Vec::len), Some(1));
                assert_eq!(data.times.get(&schedule.id).map(Vec::len), Some(1));
                // May's log is outside the June window.
                assert_eq!(data.logs.get(&med.id).map(Vec::len), Some(1));
            })
            .await;
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_cleared() {
        let conn = shared_conn();
        let (med, ..) = seed_medication(&conn, "Metformin").await;
        let cache = MonthCache::new();
        let meds = vec![med];

        cache.ensure(&conn, &meds, date(2025, 6, 10)).await.unwrap();
        cache.invalidate().await;
        {
            let guard = conn.lock().await;
            guard
                .execute_batch("DROP TABLE medication_intake_logs")
                .unwrap();
        }

        let err = cache.ensure(&conn, &meds, date(2025, 6, 10)).await;
        assert!(err.is_err());
        assert_eq!(cache.current_key().await, None, "no stale key after failure");
    }

    #[tokio::test]
    async fn appended_log_is_visible_without_refetch() {
        let conn = shared_conn();
        let (med, _, time) = seed_medication(&conn, "Metformin").await;
        let cache = MonthCache::new();
        let meds = vec![med.clone()];
        cache.ensure(&conn, &meds, date(2025, 6, 10)).await.unwrap();

        let (window_start, window_end) =
            crate::recurrence::day_window_ms(date(2025, 6, 10));
        assert!(!cache.has_taken_log(time.id, window_start, window_end).await);

        cache
            .append_log(
                med.id,
                IntakeLog {
                    id: Uuid::new_v4(),
                    schedule_time_id: time.id,
                    taken_at: window_start + 1_000,
                    status: IntakeStatus::Taken,
                    actual_amount: None,
                    actual_unit: None,
                    notes: None,
                },
            )
            .await;

        assert!(cache.has_taken_log(time.id, window_start, window_end).await);
    }
}
