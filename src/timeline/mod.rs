//! Dose timeline core — recurrence rules to concrete per-day dose lists.
//!
//! Layering, leaf first: pure day enumeration (`enumerate`), the
//! month-scoped data cache (`month_cache`), per-day compliance counters
//! (`week_summary`), the UI-facing engine that ties them together and
//! owns invalidation (`engine`), and debounced day navigation (`feed`).

mod enumerate;
mod engine;
mod feed;
mod month_cache;
mod types;
mod week_summary;

pub use engine::{derive_reminders, DoseEngine, EngineError, MarkOutcome};
pub use enumerate::{day_counts, enumerate_day};
pub use feed::{DayFeed, DayView, DEFAULT_DEBOUNCE};
pub use month_cache::{MonthCache, SharedConnection};
pub use types::{DayCounts, DaySummary, DoseEntry, MonthData, MonthKey};
pub use week_summary::WeekSummaryCache;

// ── Tests ──────────────────────────────────────────────────────────────────
