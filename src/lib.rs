//! Medtrail core — offline-first medication scheduling and dose tracking.
//!
//! Turns a medication's recurrence rule ("daily at 08:00 and 20:00, for
//! two weeks") into a concrete, cache-backed timeline of dose entries
//! for any calendar day, tracks which doses were taken, and keeps the
//! timeline consistent as schedules are edited, medications are deleted,
//! and the user pages across days, weeks and months.
//!
//! The host UI talks to [`timeline::DoseEngine`] only; it never reads
//! persistence directly for dose timelines.

pub mod config;
pub mod db;
pub mod models;
pub mod recurrence;
pub mod timeline;

pub use db::DatabaseError;
pub use models::{
    IntakeLog, IntakeStatus, Medication, MedicationDraft, OwnerContext, Recurrence, Reminder,
    Schedule, ScheduleDraft, ScheduleTime, ScheduleTimeDraft,
};
pub use timeline::{
    DayCounts, DayFeed, DaySummary, DayView, DoseEngine, DoseEntry, EngineError, MarkOutcome,
};

use tracing_subscriber::EnvFilter;

/// Initialize tracing from RUST_LOG, falling back to the crate default.
/// Later calls are no-ops, so embedders and tests may both call it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
