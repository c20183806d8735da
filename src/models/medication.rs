use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{IntakeStatus, Recurrence};

/// Explicit owner/session context threaded through every persistence call.
/// There is no ambient "current user" — callers must hold one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContext {
    pub user_id: String,
    pub profile_id: String,
}

impl OwnerContext {
    pub fn new(user_id: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            profile_id: profile_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: Uuid,
    pub owner_user_id: String,
    pub owner_profile_id: String,
    pub name: String,
    pub notes: Option<String>,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One recurrence rule for a medication. Bounded schedules carry an
/// inclusive `end_date`; `is_forever` holds exactly when `end_date` is None.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub recurrence: Recurrence,
    /// Redundant cache of the schedule's time count.
    pub frequency_per_day: u32,
    pub is_forever: bool,
    /// Epoch ms of the first applicable day.
    pub start_date: i64,
    /// Epoch ms of the last applicable day (inclusive); None = forever.
    pub end_date: Option<i64>,
    /// Uppercase 3-letter weekday codes; empty = every day.
    pub days_of_week: Vec<String>,
    /// Reserved — schedules currently follow the profile's wall clock.
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTime {
    pub id: Uuid,
    pub schedule_id: Uuid,
    /// "HH:MM" wall-clock time of day.
    pub time_local: String,
    /// Free-text display string, e.g. "1 tablet (500mg)".
    pub dosage: String,
    pub dose_amount: Option<f64>,
    pub dose_unit: Option<String>,
    pub instructions: Option<String>,
    /// "As needed" — excluded from compliance accounting.
    pub prn: bool,
    pub sort_order: i32,
}

/// Append-only record of one actual intake event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeLog {
    pub id: Uuid,
    pub schedule_time_id: Uuid,
    pub taken_at: i64,
    pub status: IntakeStatus,
    pub actual_amount: Option<f64>,
    pub actual_unit: Option<String>,
    pub notes: Option<String>,
}

/// The data a notification delivery subsystem needs for one dose slot.
/// Actual OS scheduling lives outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub medication_id: Uuid,
    pub schedule_time_id: Option<Uuid>,
    pub time_local: String,
    pub label: String,
    pub enabled: bool,
}

// ═══════════════════════════════════════════
// Draft (input) types
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct MedicationDraft {
    pub name: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleTimeDraft {
    pub time_local: String,
    pub dosage: String,
    pub dose_amount: Option<f64>,
    pub dose_unit: Option<String>,
    pub instructions: Option<String>,
    pub prn: bool,
    pub sort_order: i32,
}

/// Full-replace schedule edit: the wizard submits the whole schedule,
/// prior schedules and times for the medication are dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDraft {
    pub is_forever: bool,
    pub start_date: i64,
    pub end_date: Option<i64>,
    pub days_of_week: Vec<String>,
    pub times: Vec<ScheduleTimeDraft>,
}
