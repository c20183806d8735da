//! Dose engine — the UI-facing surface of the timeline core.
//!
//! Owns the shared connection, the loaded medication list and both
//! caches. Every mutation (add/rename/archive/delete medication,
//! schedule replacement) goes through here so invalidation cannot be
//! forgotten. Day/week reads go month cache → day enumerator.
//!
//! Concurrency model: cooperative single consumer. All cache state sits
//! behind `tokio::sync` locks, so the engine stays correct if the host
//! drives it from more than one task; locks are taken sequentially and
//! never held across each other.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::enumerate::{day_counts, enumerate_day};
use super::month_cache::{MonthCache, SharedConnection};
use super::types::{DaySummary, DoseEntry};
use super::week_summary::WeekSummaryCache;
use crate::db::{self, DatabaseError};
use crate::models::*;
use crate::recurrence::{date_of_ms, day_window_ms};

/// Attempts for the fire-and-forget intake persist before giving up.
const PERSIST_ATTEMPTS: u32 = 3;
/// Base backoff between persist attempts; doubles per retry.
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

/// Result of a `mark_taken` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The dose was recorded; persistence is in flight.
    Recorded,
    /// The entry was already taken — nothing changed.
    AlreadyTaken,
}

pub struct DoseEngine {
    conn: SharedConnection,
    ctx: OwnerContext,
    medications: RwLock<Vec<Medication>>,
    month: MonthCache,
    week: Mutex<WeekSummaryCache>,
}

impl DoseEngine {
    /// Open (and migrate) the owner's database file.
    pub fn open(path: &Path, ctx: OwnerContext) -> Result<Self, EngineError> {
        let conn = db::open_database(path)?;
        Ok(Self::with_connection(conn, ctx))
    }

    /// Wrap an already-open connection (in-memory databases, tests).
    pub fn with_connection(conn: Connection, ctx: OwnerContext) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            ctx,
            medications: RwLock::new(Vec::new()),
            month: MonthCache::new(),
            week: Mutex::new(WeekSummaryCache::new()),
        }
    }

    pub fn context(&self) -> &OwnerContext {
        &self.ctx
    }

    /// Shared handle to the underlying connection, for collaborators
    /// that read outside the dose timeline (e.g. reminder listings).
    pub fn connection(&self) -> SharedConnection {
        Arc::clone(&self.conn)
    }

    /// Snapshot of the loaded medication list.
    pub async fn medications(&self) -> Vec<Medication> {
        self.medications.read().await.clone()
    }

    // ── Reads ───────────────────────────────────────────────

    /// Reload the owner's medications from the gateway. Returns the count.
    pub async fn reload_medications(&self) -> Result<usize, EngineError> {
        let meds = {
            let conn = self.conn.lock().await;
            db::list_medications(&conn, &self.ctx)?
        };
        let count = meds.len();
        *self.medications.write().await = meds;
        Ok(count)
    }

    /// Make sure `day`'s month is cached. Awaited by navigation before
    /// the day is enumerated.
    pub async fn ensure_month(&self, day: NaiveDate) -> Result<(), EngineError> {
        let meds = self.medications.read().await.clone();
        self.month.ensure(&self.conn, &meds, day).await?;
        Ok(())
    }

    /// Drop both caches; the next read refetches. Called after every
    /// mutation — cross-month effects make targeted invalidation unsafe.
    pub async fn invalidate(&self) {
        self.month.invalidate().await;
        self.week.lock().await.clear();
    }

    /// The ordered dose timeline for one calendar day.
    pub async fn entries_for_day(&self, day: NaiveDate) -> Result<Vec<DoseEntry>, EngineError> {
        self.ensure_month(day).await?;
        let meds = self.medications.read().await;
        let entries = self
            .month
            .with_data(|data| enumerate_day(day, &meds, data))
            .await;
        Ok(entries)
    }

    /// One day's (taken, total), served from the week cache when warm.
    pub async fn day_summary(&self, day: NaiveDate) -> Result<DaySummary, EngineError> {
        if let Some(counts) = self.week.lock().await.get(day) {
            return Ok(DaySummary {
                day,
                taken: counts.taken,
                total: counts.total,
            });
        }
        let entries = self.entries_for_day(day).await?;
        let counts = day_counts(&entries);
        self.week.lock().await.insert(day, counts);
        Ok(DaySummary {
            day,
            taken: counts.taken,
            total: counts.total,
        })
    }

    /// Summaries for the 7 days starting at `week_monday`. Incremental:
    /// each day is cached as soon as it is computed, so days finished
    /// before a failure stay available for the next attempt.
    pub async fn compute_week(
        &self,
        week_monday: NaiveDate,
    ) -> Result<Vec<DaySummary>, EngineError> {
        let mut summaries = Vec::with_capacity(7);
        for offset in 0..7 {
            let day = week_monday + chrono::Duration::days(offset);
            summaries.push(self.day_summary(day).await?);
        }
        Ok(summaries)
    }

    // ── Intake recording ────────────────────────────────────

    /// Record a dose as taken. Idempotent by entry identity: an entry
    /// already taken (or already counted for its day in the cached
    /// month) is a no-op, not an error.
    ///
    /// The in-memory state updates immediately — week counter bumped,
    /// synthetic log appended so re-enumeration reflects the dose
    /// without a refetch — then the write persists in the background.
    pub async fn mark_taken(self: &Arc<Self>, entry: &DoseEntry) -> Result<MarkOutcome, EngineError> {
        if entry.taken {
            return Ok(MarkOutcome::AlreadyTaken);
        }
        let day = date_of_ms(entry.timestamp_ms);
        let (window_start, window_end) = day_window_ms(day);
        if self
            .month
            .has_taken_log(entry.schedule_time_id, window_start, window_end)
            .await
        {
            return Ok(MarkOutcome::AlreadyTaken);
        }

        let now = chrono::Utc::now().timestamp_millis();
        // The log must land inside the day window the enumerator counts;
        // marking a past day's dose stamps its scheduled instant.
        let taken_at = if now >= window_start && now < window_end {
            now
        } else {
            entry.timestamp_ms
        };
        let log = IntakeLog {
            id: Uuid::new_v4(),
            schedule_time_id: entry.schedule_time_id,
            taken_at,
            status: IntakeStatus::Taken,
            actual_amount: None,
            actual_unit: None,
            notes: None,
        };

        if !entry.prn {
            self.week.lock().await.record_optimistic_taken(day);
        }
        self.month.append_log(entry.medication_id, log.clone()).await;
        self.spawn_persist(log);
        Ok(MarkOutcome::Recorded)
    }

    /// Background persist with retry/backoff. On final failure the
    /// caches are invalidated so the next refresh reconciles the
    /// optimistic state against what actually persisted.
    fn spawn_persist(self: &Arc<Self>, log: IntakeLog) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut delay = PERSIST_RETRY_DELAY;
            for attempt in 1..=PERSIST_ATTEMPTS {
                let result = {
                    let conn = engine.conn.lock().await;
                    db::record_intake(&conn, &log)
                };
                match result {
                    Ok(()) => {
                        if attempt > 1 {
                            tracing::info!(log_id = %log.id, attempt, "intake log persisted after retry");
                        }
                        return;
                    }
                    Err(e) if attempt < PERSIST_ATTEMPTS => {
                        tracing::warn!(
                            log_id = %log.id,
                            attempt,
                            error = %e,
                            "intake log persist failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                    Err(e) => {
                        tracing::error!(
                            log_id = %log.id,
                            error = %e,
                            "intake log persist failed permanently; invalidating caches to reconcile"
                        );
                        engine.invalidate().await;
                    }
                }
            }
        });
    }

    // ── Mutations ───────────────────────────────────────────

    pub async fn add_medication(&self, draft: &MedicationDraft) -> Result<Medication, EngineError> {
        let med = {
            let conn = self.conn.lock().await;
            db::create_medication(&conn, &self.ctx, draft, now_ms())?
        };
        tracing::info!(medication_id = %med.id, name = %med.name, "medication added");
        self.reload_medications().await?;
        self.invalidate().await;
        Ok(med)
    }

    pub async fn rename_medication(
        &self,
        id: Uuid,
        name: &str,
        notes: Option<&str>,
    ) -> Result<(), EngineError> {
        {
            let conn = self.conn.lock().await;
            db::update_medication(&conn, &id, name, notes, now_ms())?;
        }
        self.reload_medications().await?;
        self.invalidate().await;
        Ok(())
    }

    /// Soft delete: hides the medication without dropping its rows.
    pub async fn archive_medication(&self, id: Uuid) -> Result<(), EngineError> {
        {
            let conn = self.conn.lock().await;
            db::archive_medication(&conn, &id, now_ms())?;
        }
        tracing::info!(medication_id = %id, "medication archived");
        self.reload_medications().await?;
        self.invalidate().await;
        Ok(())
    }

    /// Hard delete with cascade (schedules, times, reminders); intake
    /// logs are retained as history.
    pub async fn delete_medication(&self, id: Uuid) -> Result<(), EngineError> {
        {
            let mut conn = self.conn.lock().await;
            db::delete_medication(&mut conn, &id)?;
        }
        tracing::info!(medication_id = %id, "medication deleted");
        self.reload_medications().await?;
        self.invalidate().await;
        Ok(())
    }

    /// Full-replace schedule edit: validates the draft, swaps out the
    /// medication's schedules/times in one transaction, regenerates
    /// reminders from the new times, and invalidates both caches.
    pub async fn replace_schedule(
        &self,
        medication_id: Uuid,
        draft: &ScheduleDraft,
    ) -> Result<Schedule, EngineError> {
        validate_schedule_draft(draft)?;

        let schedule = Schedule {
            id: Uuid::new_v4(),
            medication_id,
            recurrence: Recurrence::Daily,
            frequency_per_day: draft.times.len() as u32,
            is_forever: draft.is_forever,
            start_date: draft.start_date,
            end_date: draft.end_date,
            days_of_week: draft
                .days_of_week
                .iter()
                .map(|d| d.trim().to_uppercase())
                .collect(),
            timezone: None,
        };
        let times: Vec<ScheduleTime> = draft
            .times
            .iter()
            .map(|t| ScheduleTime {
                id: Uuid::new_v4(),
                schedule_id: schedule.id,
                time_local: t.time_local.trim().to_string(),
                dosage: t.dosage.trim().to_string(),
                dose_amount: t.dose_amount,
                dose_unit: t.dose_unit.clone(),
                instructions: t.instructions.clone(),
                prn: t.prn,
                sort_order: t.sort_order,
            })
            .collect();

        {
            let mut conn = self.conn.lock().await;
            let med = db::get_medication(&conn, &medication_id)?.ok_or_else(|| {
                DatabaseError::NotFound {
                    entity_type: "medication".into(),
                    id: medication_id.to_string(),
                }
            })?;
            let reminders = derive_reminders(&med, &times);
            db::replace_schedule_for_medication(
                &mut conn,
                &medication_id,
                &schedule,
                &times,
                &reminders,
            )?;
        }
        tracing::info!(
            medication_id = %medication_id,
            schedule_id = %schedule.id,
            times = times.len(),
            "schedule replaced"
        );
        self.invalidate().await;
        Ok(schedule)
    }
}

/// The reminder rows for one schedule's times: one per non-PRN time,
/// carrying everything a delivery subsystem needs (name + dosage +
/// local time).
pub fn derive_reminders(medication: &Medication, times: &[ScheduleTime]) -> Vec<Reminder> {
    times
        .iter()
        .filter(|t| !t.prn)
        .map(|t| Reminder {
            id: Uuid::new_v4(),
            medication_id: medication.id,
            schedule_time_id: Some(t.id),
            time_local: t.time_local.clone(),
            label: format!("{} {}", medication.name, t.dosage).trim().to_string(),
            enabled: true,
        })
        .collect()
}

fn validate_schedule_draft(draft: &ScheduleDraft) -> Result<(), EngineError> {
    if draft.is_forever != draft.end_date.is_none() {
        return Err(EngineError::InvalidSchedule(
            "a schedule is either forever or has an end date, not both".into(),
        ));
    }
    if let Some(end) = draft.end_date {
        if draft.start_date > end {
            return Err(EngineError::InvalidSchedule(
                "start date is after end date".into(),
            ));
        }
    }
    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
