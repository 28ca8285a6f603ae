// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Engine configuration builder (spec.md §6, §9).

use crate::constants::{DEFAULT_FLUSH_THRESHOLD, DEFAULT_WAL_SEGMENT_COUNT};
use crate::path::absolute_path;
use std::path::{Path, PathBuf};

/// When a new chunk is started ahead of the "current chunk is full" case
/// that always applies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RolloverStrategy {
    /// Roll only when the current chunk's data blocks are exhausted.
    None,
    /// Roll at the first write past local midnight, in addition to the
    /// chunk-full case.
    Daily,
    /// Roll once the current chunk's occupied bytes cross a threshold,
    /// ahead of it actually filling.
    SizeBased,
    /// Roll once the current chunk's span exceeds a fixed duration.
    TimeBased,
}

const DEFAULT_BLOCK_SIZE_EXTENTS: u32 = 1;
const DEFAULT_CHUNK_SIZE_EXTENTS: u32 = 1024;

#[derive(Clone)]
/// Storage engine configuration builder.
pub struct EngineConfig {
    /// Directory holding the raw container, compact containers, and any
    /// sidecar files the in-memory catalog is not responsible for.
    #[doc(hidden)]
    pub data_dir: PathBuf,

    /// Block size for the raw container's layout, in extents.
    pub block_size_extents: u32,

    /// Chunk size for the raw container's layout, in extents.
    pub chunk_size_extents: u32,

    /// Number of rotating WAL segments.
    pub wal_segment_count: u32,

    /// Per-tag record count that triggers a block flush.
    pub flush_threshold: usize,

    /// Strategy governing when to roll to a new chunk ahead of it filling.
    pub rollover_strategy: RolloverStrategy,

    /// Size threshold in bytes for [`RolloverStrategy::SizeBased`].
    pub rollover_size_bytes: u64,

    /// Span threshold in microseconds for [`RolloverStrategy::TimeBased`].
    pub rollover_span_us: i64,

    /// Minimum block age, in microseconds, before the archiver will
    /// migrate it into the compact container.
    pub archive_min_age_us: i64,

    /// How many days of compact-archived data to retain before a
    /// retention sweep reclaims its chunk. `None` disables retention.
    pub retention_days: Option<u32>,

    /// Open the backing container with `O_DIRECT` where the platform
    /// supports it. Has no effect on the block-device backend, which is
    /// always unbuffered.
    pub direct_io: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: absolute_path(Path::new(".xtdb.data")),
            block_size_extents: DEFAULT_BLOCK_SIZE_EXTENTS,
            chunk_size_extents: DEFAULT_CHUNK_SIZE_EXTENTS,
            wal_segment_count: DEFAULT_WAL_SEGMENT_COUNT,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            rollover_strategy: RolloverStrategy::None,
            rollover_size_bytes: 0,
            rollover_span_us: 0,
            archive_min_age_us: 7 * 24 * 3_600 * 1_000_000,
            retention_days: None,
            direct_io: false,
        }
    }
}

impl EngineConfig {
    /// Initializes a new config rooted at `data_dir`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: absolute_path(data_dir.as_ref()),
            ..Default::default()
        }
    }

    /// Sets the raw container's block and chunk size, in extents.
    ///
    /// # Panics
    ///
    /// Panics if `block_size_extents` is 0, or `block_size_extents` exceeds
    /// `chunk_size_extents`.
    #[must_use]
    pub fn layout(mut self, block_size_extents: u32, chunk_size_extents: u32) -> Self {
        assert!(block_size_extents > 0, "block_size_extents must be > 0");
        assert!(
            block_size_extents <= chunk_size_extents,
            "block_size_extents cannot exceed chunk_size_extents"
        );
        self.block_size_extents = block_size_extents;
        self.chunk_size_extents = chunk_size_extents;
        self
    }

    /// Sets the number of rotating WAL segments.
    ///
    /// Defaults to 4.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0.
    #[must_use]
    pub fn wal_segment_count(mut self, n: u32) -> Self {
        assert!(n > 0, "wal_segment_count must be > 0");
        self.wal_segment_count = n;
        self
    }

    /// Sets the per-tag record count that triggers a block flush.
    ///
    /// Defaults to 1000.
    #[must_use]
    pub fn flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Sets the chunk rollover strategy.
    ///
    /// Defaults to [`RolloverStrategy::None`].
    #[must_use]
    pub fn rollover_strategy(mut self, strategy: RolloverStrategy) -> Self {
        self.rollover_strategy = strategy;
        self
    }

    /// Sets the size threshold for [`RolloverStrategy::SizeBased`], in
    /// bytes of chunk data written so far.
    #[must_use]
    pub fn rollover_size_bytes(mut self, bytes: u64) -> Self {
        self.rollover_size_bytes = bytes;
        self
    }

    /// Sets the span threshold for [`RolloverStrategy::TimeBased`], in
    /// microseconds between the chunk's first and most recent write.
    #[must_use]
    pub fn rollover_span_us(mut self, span_us: i64) -> Self {
        self.rollover_span_us = span_us;
        self
    }

    /// Sets the minimum block age the archiver will consider for
    /// migration into the compact container.
    ///
    /// Defaults to 7 days.
    #[must_use]
    pub fn archive_min_age_us(mut self, age_us: i64) -> Self {
        self.archive_min_age_us = age_us;
        self
    }

    /// Enables retention: chunks whose data is older than `days` and
    /// fully archived become eligible for reclaim.
    ///
    /// Defaults to disabled.
    #[must_use]
    pub fn retention_days(mut self, days: u32) -> Self {
        self.retention_days = Some(days);
        self
    }

    /// Requests unbuffered (`O_DIRECT`-style) I/O on the raw container
    /// where the platform supports it.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn direct_io(mut self, enabled: bool) -> Self {
        self.direct_io = enabled;
        self
    }

    /// Opens a storage engine using this config.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs, or the backing container's
    /// header is corrupt.
    pub fn open(self) -> crate::Result<crate::engine::StorageEngine> {
        crate::engine::StorageEngine::open(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn default_config_has_sane_layout() {
        let config = EngineConfig::default();
        assert!(config.block_size_extents <= config.chunk_size_extents);
        assert_eq!(config.wal_segment_count, DEFAULT_WAL_SEGMENT_COUNT);
    }

    #[test]
    #[should_panic(expected = "block_size_extents cannot exceed")]
    fn layout_rejects_block_larger_than_chunk() {
        let _ = EngineConfig::default().layout(10, 5);
    }
}
