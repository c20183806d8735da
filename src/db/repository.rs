//! Persistence gateway — CRUD over the five entity tables.
//!
//! All writes to medications, schedules, schedule times, intake logs and
//! reminders go through here. Owns the delete cascade: medication →
//! schedules → schedule times → reminders, in one transaction. Intake
//! logs are never cascaded — dose history is retained after deletes.

use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::*;

fn parse_uuid(s: &str, entity: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|_| DatabaseError::ConstraintViolation(format!(
        "{entity} has malformed id: {s}"
    )))
}

/// Serialise a weekday filter to its column form ("MON,WED,FRI"; "" = every day).
fn days_of_week_to_column(days: &[String]) -> String {
    days.iter()
        .map(|d| d.trim().to_uppercase())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the weekday filter column. Unknown codes are kept — the
/// recurrence check ignores them (they never match a real day).
fn days_of_week_from_column(column: &str) -> Vec<String> {
    column
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

// ═══════════════════════════════════════════
// Medications
// ═══════════════════════════════════════════

/// Insert a new medication owned by `ctx` and return it.
pub fn create_medication(
    conn: &Connection,
    ctx: &OwnerContext,
    draft: &MedicationDraft,
    now_ms: i64,
) -> Result<Medication, DatabaseError> {
    let med = Medication {
        id: Uuid::new_v4(),
        owner_user_id: ctx.user_id.clone(),
        owner_profile_id: ctx.profile_id.clone(),
        name: draft.name.trim().to_string(),
        notes: draft.notes.as_deref().map(str::trim).map(String::from),
        is_deleted: false,
        created_at: now_ms,
        updated_at: now_ms,
    };
    conn.execute(
        "INSERT INTO medications (id, owner_user_id, owner_profile_id, name, notes,
         is_deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
        params![
            med.id.to_string(),
            med.owner_user_id,
            med.owner_profile_id,
            med.name,
            med.notes,
            med.created_at,
            med.updated_at,
        ],
    )?;
    Ok(med)
}

pub fn get_medication(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<Medication>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, owner_user_id, owner_profile_id, name, notes, is_deleted,
                created_at, updated_at
         FROM medications WHERE id = ?1",
        params![id.to_string()],
        medication_row,
    );

    match result {
        Ok(row) => Ok(Some(medication_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List the owner's medications, excluding archived ones.
pub fn list_medications(
    conn: &Connection,
    ctx: &OwnerContext,
) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_user_id, owner_profile_id, name, notes, is_deleted,
                created_at, updated_at
         FROM medications
         WHERE owner_user_id = ?1 AND owner_profile_id = ?2 AND is_deleted = 0
         ORDER BY name COLLATE NOCASE ASC, created_at ASC",
    )?;
    let rows = stmt
        .query_map(params![ctx.user_id, ctx.profile_id], medication_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(medication_from_row).collect()
}

/// Update name/notes in place; bumps `updated_at`.
pub fn update_medication(
    conn: &Connection,
    id: &Uuid,
    name: &str,
    notes: Option<&str>,
    now_ms: i64,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET name = ?2, notes = ?3, updated_at = ?4 WHERE id = ?1",
        params![id.to_string(), name.trim(), notes.map(str::trim), now_ms],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "medication".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Soft delete: the medication stops appearing in listings but its rows
/// (and history) stay in place.
pub fn archive_medication(
    conn: &Connection,
    id: &Uuid,
    now_ms: i64,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET is_deleted = 1, updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), now_ms],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "medication".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Hard delete with cascade: schedule times → schedules → reminders →
/// the medication itself, in one transaction. Intake logs are retained
/// (orphaned by policy — they are the dose history).
pub fn delete_medication(conn: &mut Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let id_str = id.to_string();
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM medication_schedule_times WHERE schedule_id IN
         (SELECT id FROM medication_schedules WHERE medication_id = ?1)",
        params![id_str],
    )?;
    tx.execute(
        "DELETE FROM medication_schedules WHERE medication_id = ?1",
        params![id_str],
    )?;
    tx.execute(
        "DELETE FROM medication_reminders WHERE medication_id = ?1",
        params![id_str],
    )?;
    let changed = tx.execute("DELETE FROM medications WHERE id = ?1", params![id_str])?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "medication".into(),
            id: id_str,
        });
    }
    tx.commit()?;
    Ok(())
}

struct MedicationRow {
    id: String,
    owner_user_id: String,
    owner_profile_id: String,
    name: String,
    notes: Option<String>,
    is_deleted: i32,
    created_at: i64,
    updated_at: i64,
}

fn medication_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MedicationRow> {
    Ok(MedicationRow {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        owner_profile_id: row.get(2)?,
        name: row.get(3)?,
        notes: row.get(4)?,
        is_deleted: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn medication_from_row(row: MedicationRow) -> Result<Medication, DatabaseError> {
    Ok(Medication {
        id: parse_uuid(&row.id, "medication")?,
        owner_user_id: row.owner_user_id,
        owner_profile_id: row.owner_profile_id,
        name: row.name,
        notes: row.notes,
        is_deleted: row.is_deleted != 0,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// ═══════════════════════════════════════════
// Schedules
// ═══════════════════════════════════════════

pub fn create_schedule(conn: &Connection, schedule: &Schedule) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_schedules (id, medication_id, recurrence, frequency_per_day,
         is_forever, start_date, end_date, days_of_week, timezone)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            schedule.id.to_string(),
            schedule.medication_id.to_string(),
            schedule.recurrence.as_str(),
            schedule.frequency_per_day,
            schedule.is_forever as i32,
            schedule.start_date,
            schedule.end_date,
            days_of_week_to_column(&schedule.days_of_week),
            schedule.timezone,
        ],
    )?;
    Ok(())
}

pub fn list_schedules_for_medication(
    conn: &Connection,
    medication_id: &Uuid,
) -> Result<Vec<Schedule>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medication_id, recurrence, frequency_per_day, is_forever,
                start_date, end_date, days_of_week, timezone
         FROM medication_schedules
         WHERE medication_id = ?1
         ORDER BY start_date ASC",
    )?;
    let rows = stmt
        .query_map(params![medication_id.to_string()], schedule_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(schedule_from_row).collect()
}

/// Delete a schedule and its times. Times go first — the schedule row is
/// their foreign-key target.
pub fn delete_schedule(conn: &mut Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let id_str = id.to_string();
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM medication_schedule_times WHERE schedule_id = ?1",
        params![id_str],
    )?;
    let changed = tx.execute(
        "DELETE FROM medication_schedules WHERE id = ?1",
        params![id_str],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "schedule".into(),
            id: id_str,
        });
    }
    tx.commit()?;
    Ok(())
}

/// Full-replace schedule edit, in one transaction: drop the
/// medication's existing schedules (times first) and reminders, then
/// insert the new schedule, its times, and the reminders derived from
/// them. The wizard edits whole schedules, never individual rows.
pub fn replace_schedule_for_medication(
    conn: &mut Connection,
    medication_id: &Uuid,
    schedule: &Schedule,
    times: &[ScheduleTime],
    reminders: &[Reminder],
) -> Result<(), DatabaseError> {
    let med_id_str = medication_id.to_string();
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM medication_schedule_times WHERE schedule_id IN
         (SELECT id FROM medication_schedules WHERE medication_id = ?1)",
        params![med_id_str],
    )?;
    tx.execute(
        "DELETE FROM medication_schedules WHERE medication_id = ?1",
        params![med_id_str],
    )?;
    tx.execute(
        "DELETE FROM medication_reminders WHERE medication_id = ?1",
        params![med_id_str],
    )?;
    tx.execute(
        "INSERT INTO medication_schedules (id, medication_id, recurrence, frequency_per_day,
         is_forever, start_date, end_date, days_of_week, timezone)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            schedule.id.to_string(),
            schedule.medication_id.to_string(),
            schedule.recurrence.as_str(),
            schedule.frequency_per_day,
            schedule.is_forever as i32,
            schedule.start_date,
            schedule.end_date,
            days_of_week_to_column(&schedule.days_of_week),
            schedule.timezone,
        ],
    )?;
    for time in times {
        tx.execute(
            "INSERT INTO medication_schedule_times (id, schedule_id, time_local, dosage,
             dose_amount, dose_unit, instructions, prn, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                time.id.to_string(),
                time.schedule_id.to_string(),
                time.time_local,
                time.dosage,
                time.dose_amount,
                time.dose_unit,
                time.instructions,
                time.prn as i32,
                time.sort_order,
            ],
        )?;
    }
    for reminder in reminders {
        tx.execute(
            "INSERT INTO medication_reminders (id, medication_id, schedule_time_id,
             time_local, label, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                reminder.id.to_string(),
                reminder.medication_id.to_string(),
                reminder.schedule_time_id.map(|id| id.to_string()),
                reminder.time_local,
                reminder.label,
                reminder.enabled as i32,
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

struct ScheduleRow {
    id: String,
    medication_id: String,
    recurrence: String,
    frequency_per_day: u32,
    is_forever: i32,
    start_date: i64,
    end_date: Option<i64>,
    days_of_week: String,
    timezone: Option<String>,
}

fn schedule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRow> {
    Ok(ScheduleRow {
        id: row.get(0)?,
        medication_id: row.get(1)?,
        recurrence: row.get(2)?,
        frequency_per_day: row.get(3)?,
        is_forever: row.get(4)?,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
        days_of_week: row.get(7)?,
        timezone: row.get(8)?,
    })
}

fn schedule_from_row(row: ScheduleRow) -> Result<Schedule, DatabaseError> {
    Ok(Schedule {
        id: parse_uuid(&row.id, "schedule")?,
        medication_id: parse_uuid(&row.medication_id, "schedule")?,
        recurrence: Recurrence::from_str(&row.recurrence)?,
        frequency_per_day: row.frequency_per_day,
        is_forever: row.is_forever != 0,
        start_date: row.start_date,
        end_date: row.end_date,
        days_of_week: days_of_week_from_column(&row.days_of_week),
        timezone: row.timezone,
    })
}

// ═══════════════════════════════════════════
// Schedule times
// ═══════════════════════════════════════════

pub fn create_schedule_time(
    conn: &Connection,
    time: &ScheduleTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_schedule_times (id, schedule_id, time_local, dosage,
         dose_amount, dose_unit, instructions, prn, sort_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            time.id.to_string(),
            time.schedule_id.to_string(),
            time.time_local,
            time.dosage,
            time.dose_amount,
            time.dose_unit,
            time.instructions,
            time.prn as i32,
            time.sort_order,
        ],
    )?;
    Ok(())
}

/// Times of a schedule, ordered by `sort_order` then `time_local`
/// (string comparison breaks sort-order ties).
pub fn list_times_for_schedule(
    conn: &Connection,
    schedule_id: &Uuid,
) -> Result<Vec<ScheduleTime>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, schedule_id, time_local, dosage, dose_amount, dose_unit,
                instructions, prn, sort_order
         FROM medication_schedule_times
         WHERE schedule_id = ?1
         ORDER BY sort_order ASC, time_local ASC",
    )?;
    let rows = stmt
        .query_map(params![schedule_id.to_string()], schedule_time_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(schedule_time_from_row).collect()
}

struct ScheduleTimeRow {
    id: String,
    schedule_id: String,
    time_local: String,
    dosage: String,
    dose_amount: Option<f64>,
    dose_unit: Option<String>,
    instructions: Option<String>,
    prn: i32,
    sort_order: i32,
}

fn schedule_time_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleTimeRow> {
    Ok(ScheduleTimeRow {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        time_local: row.get(2)?,
        dosage: row.get(3)?,
        dose_amount: row.get(4)?,
        dose_unit: row.get(5)?,
        instructions: row.get(6)?,
        prn: row.get(7)?,
        sort_order: row.get(8)?,
    })
}

fn schedule_time_from_row(row: ScheduleTimeRow) -> Result<ScheduleTime, DatabaseError> {
    Ok(ScheduleTime {
        id: parse_uuid(&row.id, "schedule_time")?,
        schedule_id: parse_uuid(&row.schedule_id, "schedule_time")?,
        time_local: row.time_local,
        dosage: row.dosage,
        dose_amount: row.dose_amount,
        dose_unit: row.dose_unit,
        instructions: row.instructions,
        prn: row.prn != 0,
        sort_order: row.sort_order,
    })
}

pub fn delete_schedule_time(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM medication_schedule_times WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "schedule_time".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Intake logs
// ═══════════════════════════════════════════

/// Append-only insert. Retry-safe: a retry that reuses the same log id
/// and hits the primary key is treated as already-persisted, not an error.
pub fn record_intake(conn: &Connection, log: &IntakeLog) -> Result<(), DatabaseError> {
    let result = conn.execute(
        "INSERT INTO medication_intake_logs (id, schedule_time_id, taken_at, status,
         actual_amount, actual_unit, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            log.id.to_string(),
            log.schedule_time_id.to_string(),
            log.taken_at,
            log.status.as_str(),
            log.actual_amount,
            log.actual_unit,
            log.notes,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let exists: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM medication_intake_logs WHERE id = ?1",
                params![log.id.to_string()],
                |row| row.get(0),
            )?;
            if exists {
                Ok(())
            } else {
                Err(DatabaseError::ConstraintViolation(format!(
                    "intake log insert rejected: {}",
                    log.id
                )))
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Range query joining schedule → schedule time → intake log; bounds are
/// `[from_ts, to_ts)` epoch ms. Called once per month per medication by
/// the month cache.
pub fn list_intake_logs(
    conn: &Connection,
    medication_id: &Uuid,
    from_ts: i64,
    to_ts: i64,
) -> Result<Vec<IntakeLog>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.schedule_time_id, l.taken_at, l.status,
                l.actual_amount, l.actual_unit, l.notes
         FROM medication_intake_logs l
         INNER JOIN medication_schedule_times t ON l.schedule_time_id = t.id
         INNER JOIN medication_schedules s ON t.schedule_id = s.id
         WHERE s.medication_id = ?1 AND l.taken_at >= ?2 AND l.taken_at < ?3
         ORDER BY l.taken_at ASC",
    )?;
    let rows = stmt
        .query_map(params![medication_id.to_string(), from_ts, to_ts], intake_log_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(intake_log_from_row).collect()
}

struct IntakeLogRow {
    id: String,
    schedule_time_id: String,
    taken_at: i64,
    status: String,
    actual_amount: Option<f64>,
    actual_unit: Option<String>,
    notes: Option<String>,
}

fn intake_log_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IntakeLogRow> {
    Ok(IntakeLogRow {
        id: row.get(0)?,
        schedule_time_id: row.get(1)?,
        taken_at: row.get(2)?,
        status: row.get(3)?,
        actual_amount: row.get(4)?,
        actual_unit: row.get(5)?,
        notes: row.get(6)?,
    })
}

fn intake_log_from_row(row: IntakeLogRow) -> Result<IntakeLog, DatabaseError> {
    Ok(IntakeLog {
        id: parse_uuid(&row.id, "intake_log")?,
        schedule_time_id: parse_uuid(&row.schedule_time_id, "intake_log")?,
        taken_at: row.taken_at,
        status: IntakeStatus::from_str(&row.status)?,
        actual_amount: row.actual_amount,
        actual_unit: row.actual_unit,
        notes: row.notes,
    })
}

// ═══════════════════════════════════════════
// Reminders
// ═══════════════════════════════════════════

pub fn insert_reminder(conn: &Connection, reminder: &Reminder) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_reminders (id, medication_id, schedule_time_id,
         time_local, label, enabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            reminder.id.to_string(),
            reminder.medication_id.to_string(),
            reminder.schedule_time_id.map(|id| id.to_string()),
            reminder.time_local,
            reminder.label,
            reminder.enabled as i32,
        ],
    )?;
    Ok(())
}

pub fn list_reminders_for_medication(
    conn: &Connection,
    medication_id: &Uuid,
) -> Result<Vec<Reminder>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medication_id, schedule_time_id, time_local, label, enabled
         FROM medication_reminders
         WHERE medication_id = ?1
         ORDER BY time_local ASC",
    )?;
    let rows = stmt
        .query_map(params![medication_id.to_string()], reminder_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(reminder_from_row).collect()
}

struct ReminderRow {
    id: String,
    medication_id: String,
    schedule_time_id: Option<String>,
    time_local: String,
    label: String,
    enabled: i32,
}

fn reminder_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReminderRow> {
    Ok(ReminderRow {
        id: row.get(0)?,
        medication_id: row.get(1)?,
        schedule_time_id: row.get(2)?,
        time_local: row.get(3)?,
        label: row.get(4)?,
        enabled: row.get(5)?,
    })
}

fn reminder_from_row(row: ReminderRow) -> Result<Reminder, DatabaseError> {
    Ok(Reminder {
        id: parse_uuid(&row.id, "reminder")?,
        medication_id: parse_uuid(&row.medication_id, "reminder")?,
        schedule_time_id: row
            .schedule_time_id
            .map(|s| parse_uuid(&s, "reminder"))
            .transpose()?,
        time_local: row.time_local,
        label: row.label,
        enabled: row.enabled != 0,
    })
}

pub fn delete_reminders_for_medication(
    conn: &Connection,
    medication_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM medication_reminders WHERE medication_id = ?1",
        params![medication_id.to_string()],
    )?;
    Ok(removed)
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
