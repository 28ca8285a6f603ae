// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Memory buffer (spec.md §4.8): per-tag, time-ordered record vectors
//! keyed by tag id, with a flush threshold per tag.

use crate::constants::DEFAULT_FLUSH_THRESHOLD;
use crate::value::{EncodingType, TimeUnit, Value, ValueType};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::sync::RwLock;

/// One in-memory sample, already widened to the tag's declared type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemRecord {
    pub timestamp_us: i64,
    pub value: Value,
    pub quality: u8,
}

/// Static per-tag configuration chosen when the tag is first seen.
#[derive(Clone, Copy, Debug)]
pub struct TagConfig {
    pub value_type: ValueType,
    pub time_unit: TimeUnit,
    pub encoding_type: EncodingType,
    pub encoding_param1: f32,
    pub encoding_param2: f32,
}

/// Records accumulated for a single tag since its last drain.
pub struct TagBuffer {
    pub tag_id: u32,
    pub config: TagConfig,
    pub start_ts_us: i64,
    pub records: Vec<MemRecord>,
}

impl TagBuffer {
    fn new(tag_id: u32, config: TagConfig) -> Self {
        Self {
            tag_id,
            config,
            start_ts_us: 0,
            records: Vec::new(),
        }
    }

    fn push(&mut self, record: MemRecord) -> Result<()> {
        if let Some(last) = self.records.last() {
            if record.timestamp_us < last.timestamp_us {
                return Err(Error::InvalidArgument(format!(
                    "tag {} received out-of-order timestamp {} after {}",
                    self.tag_id, record.timestamp_us, last.timestamp_us
                )));
            }
        } else {
            self.start_ts_us = record.timestamp_us;
        }
        self.records.push(record);
        Ok(())
    }

    /// Converts an absolute timestamp to a block-local integer offset in
    /// the buffer's time unit (spec.md §4.8).
    #[must_use]
    pub fn time_offset(&self, timestamp_us: i64) -> i64 {
        (timestamp_us - self.start_ts_us) / self.config.time_unit.micros_per_unit()
    }

    #[must_use]
    pub fn should_flush(&self, threshold: usize) -> bool {
        self.records.len() >= threshold
    }

    /// Clears the records but keeps the buffer's identity and config, so
    /// the next write reuses it (spec.md §3 lifecycle).
    pub fn drain(&mut self) -> Vec<MemRecord> {
        std::mem::take(&mut self.records)
    }

    /// A read-only snapshot of records in `[t0, t1]`, for the query path.
    #[must_use]
    pub fn snapshot_range(&self, t0: i64, t1: i64) -> Vec<MemRecord> {
        self.records
            .iter()
            .copied()
            .filter(|r| r.timestamp_us >= t0 && r.timestamp_us <= t1)
            .collect()
    }
}

/// Hash map of `tag_id -> TagBuffer`, single-writer per tag, with
/// short-lock snapshot reads for the query path (spec.md §4.8).
#[derive(Default)]
pub struct MemoryBuffer {
    tags: RwLock<FxHashMap<u32, TagBuffer>>,
}

impl MemoryBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one record, creating the tag's buffer with `config` on
    /// first sight. Returns whether the tag's default flush threshold has
    /// now been reached.
    pub fn write(
        &self,
        tag_id: u32,
        config: TagConfig,
        timestamp_us: i64,
        value: Value,
        quality: u8,
    ) -> Result<bool> {
        let mut tags = self.tags.write().expect("buffer lock poisoned");
        let buffer = tags.entry(tag_id).or_insert_with(|| TagBuffer::new(tag_id, config));
        buffer.push(MemRecord {
            timestamp_us,
            value,
            quality,
        })?;
        Ok(buffer.should_flush(DEFAULT_FLUSH_THRESHOLD))
    }

    /// Drains a single tag's records, returning `None` if the tag has no
    /// buffer or has no records.
    pub fn drain_tag(&self, tag_id: u32) -> Option<(TagConfig, i64, Vec<MemRecord>)> {
        let mut tags = self.tags.write().expect("buffer lock poisoned");
        let buffer = tags.get_mut(&tag_id)?;
        if buffer.records.is_empty() {
            return None;
        }
        let start = buffer.start_ts_us;
        let config = buffer.config;
        Some((config, start, buffer.drain()))
    }

    /// Drains every tag with a non-empty buffer (engine-level threshold /
    /// chunk roll force-flush, spec.md §4.8).
    pub fn drain_all(&self) -> Vec<(u32, TagConfig, i64, Vec<MemRecord>)> {
        let mut tags = self.tags.write().expect("buffer lock poisoned");
        tags.iter_mut()
            .filter(|(_, buf)| !buf.records.is_empty())
            .map(|(tag_id, buf)| (*tag_id, buf.config, buf.start_ts_us, buf.drain()))
            .collect()
    }

    /// Short-lock snapshot of one tag's in-range records for the query
    /// path (spec.md §4.13).
    #[must_use]
    pub fn snapshot_range(&self, tag_id: u32, t0: i64, t1: i64) -> Vec<MemRecord> {
        let tags = self.tags.read().expect("buffer lock poisoned");
        tags.get(&tag_id)
            .map(|buffer| buffer.snapshot_range(t0, t1))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn tags_pending_flush(&self, threshold: usize) -> Vec<u32> {
        let tags = self.tags.read().expect("buffer lock poisoned");
        tags.values()
            .filter(|buffer| buffer.should_flush(threshold))
            .map(|buffer| buffer.tag_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn config() -> TagConfig {
        TagConfig {
            value_type: ValueType::F64,
            time_unit: TimeUnit::Us,
            encoding_type: EncodingType::Raw,
            encoding_param1: 0.0,
            encoding_param2: 0.0,
        }
    }

    #[test]
    fn writes_accumulate_in_order() -> Result<()> {
        let buffer = MemoryBuffer::new();
        for i in 0..10 {
            buffer.write(1, config(), 1_000 + i, Value::F64(f64::from(i as i32)), 192)?;
        }
        let (_, start, records) = buffer.drain_tag(1).unwrap();
        assert_eq!(start, 1_000);
        assert_eq!(records.len(), 10);
        assert_eq!(records[9].value, Value::F64(9.0));
        Ok(())
    }

    #[test]
    fn rejects_out_of_order_timestamps() -> Result<()> {
        let buffer = MemoryBuffer::new();
        buffer.write(1, config(), 2_000, Value::F64(1.0), 192)?;
        let result = buffer.write(1, config(), 1_000, Value::F64(2.0), 192);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn snapshot_range_filters_by_window() -> Result<()> {
        let buffer = MemoryBuffer::new();
        for i in 0..5 {
            buffer.write(1, config(), 1_000 * i, Value::F64(f64::from(i as i32)), 192)?;
        }
        let slice = buffer.snapshot_range(1, 1_000, 3_000);
        assert_eq!(slice.len(), 3);
        Ok(())
    }
}
