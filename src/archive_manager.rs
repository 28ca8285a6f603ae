// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Archive manager (spec.md §4.12): tracks registered archives at each
//! resolution and picks the best one to serve a query.

use std::sync::RwLock;

const ONE_HOUR_US: i64 = 3_600_000_000;
const ONE_DAY_US: i64 = 24 * ONE_HOUR_US;
const THIRTY_DAYS_US: i64 = 30 * ONE_DAY_US;

/// The resolution an archive was built at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resolution {
    Raw,
    OneMinute,
    OneHour,
    Aggregated,
}

impl Resolution {
    #[must_use]
    pub const fn priority(self) -> u32 {
        match self {
            Self::Raw => 100,
            Self::OneMinute => 75,
            Self::OneHour => 50,
            Self::Aggregated => 10,
        }
    }
}

/// One registered archive's coverage, as tracked by the manager.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
    pub archive_id: u64,
    pub resolution: Resolution,
    pub start_ts_us: i64,
    pub end_ts_us: i64,
}

impl ArchiveEntry {
    fn overlap_ratio(&self, t0: i64, t1: i64) -> f64 {
        let lo = self.start_ts_us.max(t0);
        let hi = self.end_ts_us.min(t1);
        if hi <= lo {
            return 0.0;
        }
        let overlap = (hi - lo) as f64;
        let query_span = (t1 - t0).max(1) as f64;
        (overlap / query_span).min(1.0)
    }
}

/// A query's archive selection parameters.
#[derive(Clone, Copy, Debug)]
pub struct ArchiveQuery {
    pub tag_id: u32,
    pub t0: i64,
    pub t1: i64,
    pub prefer_raw: bool,
}

/// Tracks registered archives and selects the best one per query
/// (spec.md §4.12).
#[derive(Default)]
pub struct ArchiveManager {
    entries: RwLock<Vec<ArchiveEntry>>,
}

impl ArchiveManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: ArchiveEntry) {
        self.entries.write().expect("archive manager lock poisoned").push(entry);
    }

    fn score(entry: &ArchiveEntry, query: &ArchiveQuery) -> f64 {
        let span_us = query.t1 - query.t0;
        let (w_overlap, w_resolution) = if span_us < ONE_HOUR_US {
            (0.6, 0.4)
        } else {
            (0.3, 0.7)
        };

        let overlap_ratio = entry.overlap_ratio(query.t0, query.t1);
        let mut priority_weight = f64::from(entry.resolution.priority()) / 100.0;

        match entry.resolution {
            Resolution::Raw if span_us >= ONE_DAY_US => priority_weight *= 0.5,
            Resolution::Raw if span_us >= ONE_HOUR_US => priority_weight *= 0.8,
            Resolution::OneHour if span_us >= ONE_HOUR_US => priority_weight *= 1.5,
            _ => {}
        }

        let mut score = w_overlap * overlap_ratio + w_resolution * priority_weight;
        if query.prefer_raw && entry.resolution == Resolution::Raw {
            score *= 1.5;
        }
        score
    }

    /// Selects the single best-scoring archive overlapping the query
    /// window, or `None` if nothing registered overlaps it.
    #[must_use]
    pub fn select(&self, query: &ArchiveQuery) -> Option<ArchiveEntry> {
        let entries = self.entries.read().expect("archive manager lock poisoned");
        entries
            .iter()
            .filter(|e| e.overlap_ratio(query.t0, query.t1) > 0.0)
            .max_by(|a, b| {
                Self::score(a, query)
                    .partial_cmp(&Self::score(b, query))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }

    /// Recommends a resolution for a query spanning `span_us`, independent
    /// of what is actually registered.
    #[must_use]
    pub const fn recommend_level(span_us: i64) -> Resolution {
        if span_us < ONE_HOUR_US {
            Resolution::Raw
        } else if span_us < ONE_DAY_US {
            Resolution::OneMinute
        } else if span_us < THIRTY_DAYS_US {
            Resolution::OneHour
        } else {
            Resolution::Aggregated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn recommend_level_follows_span_breakpoints() {
        assert_eq!(ArchiveManager::recommend_level(1_000), Resolution::Raw);
        assert_eq!(
            ArchiveManager::recommend_level(ONE_HOUR_US + 1),
            Resolution::OneMinute
        );
        assert_eq!(
            ArchiveManager::recommend_level(ONE_DAY_US + 1),
            Resolution::OneHour
        );
        assert_eq!(
            ArchiveManager::recommend_level(THIRTY_DAYS_US + 1),
            Resolution::Aggregated
        );
    }

    #[test]
    fn select_prefers_full_overlap_raw_for_short_span() {
        let manager = ArchiveManager::new();
        manager.register(ArchiveEntry {
            archive_id: 1,
            resolution: Resolution::Raw,
            start_ts_us: 0,
            end_ts_us: 10_000,
        });
        manager.register(ArchiveEntry {
            archive_id: 2,
            resolution: Resolution::Aggregated,
            start_ts_us: 0,
            end_ts_us: 10_000,
        });

        let query = ArchiveQuery {
            tag_id: 1,
            t0: 0,
            t1: 10_000,
            prefer_raw: false,
        };
        let chosen = manager.select(&query).unwrap();
        assert_eq!(chosen.archive_id, 1);
    }

    #[test]
    fn select_returns_none_when_nothing_overlaps() {
        let manager = ArchiveManager::new();
        manager.register(ArchiveEntry {
            archive_id: 1,
            resolution: Resolution::Raw,
            start_ts_us: 0,
            end_ts_us: 10,
        });
        let query = ArchiveQuery {
            tag_id: 1,
            t0: 1_000,
            t1: 2_000,
            prefer_raw: false,
        };
        assert!(manager.select(&query).is_none());
    }

    #[test]
    fn prefer_raw_boosts_raw_over_higher_base_priority_candidate() {
        let manager = ArchiveManager::new();
        manager.register(ArchiveEntry {
            archive_id: 1,
            resolution: Resolution::Raw,
            start_ts_us: 0,
            end_ts_us: 100,
        });
        manager.register(ArchiveEntry {
            archive_id: 2,
            resolution: Resolution::OneMinute,
            start_ts_us: 0,
            end_ts_us: 100,
        });
        let query = ArchiveQuery {
            tag_id: 1,
            t0: 0,
            t1: 100,
            prefer_raw: true,
        };
        let chosen = manager.select(&query).unwrap();
        assert_eq!(chosen.archive_id, 1);
    }
}
