//! Debounced day selection — rapid swipes coalesce so only the settled
//! day triggers a full entry rebuild.
//!
//! Each `select` bumps a generation token and spawns a delayed rebuild;
//! a rebuild whose generation is stale — superseded while debouncing, or
//! finished out of order — is dropped instead of overwriting a newer
//! day's entries. Results are delivered through a `watch` channel so the
//! UI always observes the latest settled view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::watch;

use super::engine::DoseEngine;
use super::types::DoseEntry;

/// Rebuild debounce window for rapid day/week navigation.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// The latest settled day and its entries. `day` is None until the
/// first selection settles.
#[derive(Debug, Clone, Default)]
pub struct DayView {
    pub day: Option<NaiveDate>,
    pub entries: Vec<DoseEntry>,
}

pub struct DayFeed {
    engine: Arc<DoseEngine>,
    delay: Duration,
    generation: Arc<AtomicU64>,
    tx: Arc<watch::Sender<DayView>>,
}

impl DayFeed {
    pub fn new(engine: Arc<DoseEngine>) -> (Self, watch::Receiver<DayView>) {
        Self::with_delay(engine, DEFAULT_DEBOUNCE)
    }

    pub fn with_delay(
        engine: Arc<DoseEngine>,
        delay: Duration,
    ) -> (Self, watch::Receiver<DayView>) {
        let (tx, rx) = watch::channel(DayView::default());
        (
            Self {
                engine,
                delay,
                generation: Arc::new(AtomicU64::new(0)),
                tx: Arc::new(tx),
            },
            rx,
        )
    }

    /// Select a day. Supersedes any pending selection; after the
    /// debounce window the entries are rebuilt and published.
    pub fn select(&self, day: NaiveDate) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let engine = Arc::clone(&self.engine);
        let current = Arc::clone(&self.generation);
        let tx = Arc::clone(&self.tx);
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) != generation {
                return; // superseded while debouncing
            }
            match engine.entries_for_day(day).await {
                Ok(entries) => {
                    if current.load(Ordering::SeqCst) == generation {
                        let _ = tx.send(DayView {
                            day: Some(day),
                            entries,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(day = %day, error = %e, "day rebuild failed");
                }
            }
        });
    }

    /// Drop any pending selection without publishing anything.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
