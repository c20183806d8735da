//! Week summary cache — per-day (taken, total) counters for the 7-day
//! strip, built lazily as weeks are viewed.
//!
//! The optimistic increment only ever applies to an entry already known
//! not-taken, so `taken <= total` holds for every cached day at all
//! times, including transiently.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::types::DayCounts;

#[derive(Debug, Default)]
pub struct WeekSummaryCache {
    days: HashMap<NaiveDate, DayCounts>,
}

impl WeekSummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, day: NaiveDate) -> Option<DayCounts> {
        self.days.get(&day).copied()
    }

    pub fn insert(&mut self, day: NaiveDate, counts: DayCounts) {
        self.days.insert(day, counts);
    }

    /// Bump a cached day's taken count before its write persists.
    /// Returns false (and changes nothing) when the day is uncached or
    /// already fully taken — the increment never pushes taken past total.
    pub fn record_optimistic_taken(&mut self, day: NaiveDate) -> bool {
        match self.days.get_mut(&day) {
            Some(counts) if counts.taken < counts.total => {
                counts.taken += 1;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.days.clear();
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn new_cache_is_empty() {
        let cache = WeekSummaryCache::new();
        assert!(cache.is_empty());
        assert!(cache.get(date(2)).is_none());
    }

    #[test]
    fn insert_and_get() {
        let mut cache = WeekSummaryCache::new();
        cache.insert(date(2), DayCounts { taken: 1, total: 3 });
        assert_eq!(cache.get(date(2)), Some(DayCounts { taken: 1, total: 3 }));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn optimistic_increment_bumps_taken() {
        let mut cache = WeekSummaryCache::new();
        cache.insert(date(2), DayCounts { taken: 0, total: 2 });

        assert!(cache.record_optimistic_taken(date(2)));
        assert_eq!(cache.get(date(2)), Some(DayCounts { taken: 1, total: 2 }));
    }

    #[test]
    fn optimistic_increment_never_exceeds_total() {
        let mut cache = WeekSummaryCache::new();
        cache.insert(date(2), DayCounts { taken: 2, total: 2 });

        assert!(!cache.record_optimistic_taken(date(2)));
        assert_eq!(cache.get(date(2)), Some(DayCounts { taken: 2, total: 2 }));
    }

    #[test]
    fn optimistic_increment_on_uncached_day_is_noop() {
        let mut cache = WeekSummaryCache::new();
        assert!(!cache.record_optimistic_taken(date(2)));
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_removes_all_days() {
        let mut cache = WeekSummaryCache::new();
        cache.insert(date(2), DayCounts { taken: 0, total: 1 });
        cache.insert(date(3), DayCounts { taken: 1, total: 1 });
        cache.clear();
        assert!(cache.is_empty());
    }
}
