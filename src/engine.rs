// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Storage engine: the public entry point wiring every module together
//! per the write/read data flow in spec.md §2.

use crate::block_writer::{self, Directory};
use crate::buffer::{MemRecord, MemoryBuffer, TagConfig};
use crate::catalog::{BlockRecord, ChunkRecord, MemoryCatalog, MetadataCatalog};
use crate::chunk::{Chunk, ChunkState};
use crate::compact::{ArchiveRunReport, Archiver, CompactContainer};
use crate::config::{EngineConfig, RolloverStrategy};
use crate::constants::{CHUNK_ARRAY_START_EXTENT, EXTENT_SIZE};
use crate::container::Container;
use crate::directory::BlockDirEntry;
use crate::layout::Layout;
use crate::scanner;
use crate::stats::{MaintenanceStats, ReadStats, WriteStats};
use crate::value::{EncodingType, TimeUnit, Value, ValueType};
use crate::wal::{RotatingWal, WalEntry};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// The raw container's id, as recorded in the catalog. A single engine
/// instance owns exactly one raw container, so this is a fixed constant
/// rather than something callers configure.
const RAW_CONTAINER_ID: u64 = 0;

struct WriteState {
    wal: RotatingWal,
    chunk: Chunk,
    directory: Directory,
    next_chunk_id: u64,
}

/// Top-level storage engine (spec.md §2, §6): owns the raw container, the
/// rotating WAL, the per-tag memory buffers, and the metadata catalog, and
/// exposes the write and read paths callers actually use.
pub struct StorageEngine {
    config: EngineConfig,
    container: Arc<Container>,
    layout: Layout,
    catalog: Arc<dyn MetadataCatalog>,
    memory: MemoryBuffer,
    tag_configs: RwLock<FxHashMap<u32, TagConfig>>,
    write_state: Mutex<WriteState>,
    write_stats: WriteStatsInner,
    read_stats: ReadStatsInner,
    maintenance_stats: MaintenanceStatsInner,
}

#[derive(Default)]
struct WriteStatsInner {
    points_written: AtomicU64,
    wal_appends: AtomicU64,
    wal_rotations: AtomicU64,
    blocks_flushed: AtomicU64,
    chunks_sealed: AtomicU64,
}

#[derive(Default)]
struct ReadStatsInner {
    queries: AtomicU64,
    blocks_read_raw: AtomicU64,
    blocks_read_compact: AtomicU64,
    records_returned: AtomicU64,
}

#[derive(Default)]
struct MaintenanceStatsInner {
    blocks_archived: AtomicU64,
    blocks_archive_failed: AtomicU64,
    chunks_reclaimed: AtomicU64,
}

fn chunk_offset(layout: &Layout, chunk_id: u64) -> u64 {
    CHUNK_ARRAY_START_EXTENT * EXTENT_SIZE + chunk_id * layout.chunk_size_bytes
}

impl StorageEngine {
    /// Opens (creating if missing) the raw container at `config.data_dir`
    /// and rebuilds in-memory write state: the WAL is replayed into the
    /// memory buffer, and the chunk array is scanned forward to find the
    /// first non-sealed chunk to resume writing into.
    ///
    /// # Errors
    ///
    /// Propagates container, WAL and chunk I/O errors.
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::open_with_catalog(config, Arc::new(MemoryCatalog::new()))
    }

    /// Like [`Self::open`], but with a caller-supplied catalog instead of
    /// the in-memory reference implementation.
    ///
    /// # Errors
    ///
    /// Propagates container, WAL and chunk I/O errors.
    pub fn open_with_catalog(
        config: EngineConfig,
        catalog: Arc<dyn MetadataCatalog>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let raw_path = config.data_dir.join("raw.xtdb");

        let container = Arc::new(Container::open_file(
            &raw_path,
            true,
            config.chunk_size_extents,
            config.block_size_extents,
        )?);
        let layout = Layout::compute(
            u64::from(config.block_size_extents) * EXTENT_SIZE,
            u64::from(config.chunk_size_extents) * EXTENT_SIZE,
        )?;

        let wal = RotatingWal::open(Arc::clone(&container), config.wal_segment_count)?;

        let memory = MemoryBuffer::new();
        let tag_configs = RwLock::new(FxHashMap::default());

        let (chunk, directory, next_chunk_id) = Self::recover_chunk_state(&container, layout)?;

        let engine = Self {
            config,
            container,
            layout,
            catalog,
            memory,
            tag_configs,
            write_state: Mutex::new(WriteState {
                wal,
                chunk,
                directory,
                next_chunk_id,
            }),
            write_stats: WriteStatsInner::default(),
            read_stats: ReadStatsInner::default(),
            maintenance_stats: MaintenanceStatsInner::default(),
        };

        engine.replay_wal()?;
        Ok(engine)
    }

    /// Scans the chunk array forward from id 0 to find the first chunk
    /// that is not yet `Sealed`/`Deprecated`/`Reclaimed`, allocating chunk
    /// 0 if the container has none yet.
    fn recover_chunk_state(container: &Container, layout: Layout) -> Result<(Chunk, Directory, u64)> {
        let mut chunk_id = 0u64;
        loop {
            let offset = chunk_offset(&layout, chunk_id);
            if offset + layout.chunk_size_bytes > container.len()? {
                break;
            }
            let chunk = Chunk::read_header(container, offset, layout)?;
            if !matches!(
                chunk.header.state(),
                ChunkState::Sealed | ChunkState::Deprecated | ChunkState::Reclaimed
            ) {
                let directory = Directory::read(container, offset, &layout)?;
                return Ok((chunk, directory, chunk_id + 1));
            }
            chunk_id += 1;
        }

        let offset = chunk_offset(&layout, chunk_id);
        container.preallocate(offset + layout.chunk_size_bytes)?;
        let mut chunk = Chunk::allocate(chunk_id, offset, layout);
        chunk.write_header(container)?;
        let directory = Directory::new_empty(&layout);
        directory.rewrite(container, offset, &layout)?;
        Ok((chunk, directory, chunk_id + 1))
    }

    /// Replays any WAL segments left in `Writing`/`FullAwaitingFlush` state
    /// back into the memory buffer (spec.md P3): the block writer treats
    /// these records exactly like freshly written ones on the next flush.
    fn replay_wal(&self) -> Result<()> {
        let entries = {
            let state = self.write_state.lock().expect("write state poisoned");
            state.wal.replay()?
        };
        for entry in entries {
            let value_type = ValueType::try_from(entry.value_type)?;
            let value = Value::from_bytes(value_type, &entry.value);
            let config = self.tag_config(entry.tag_id, value_type);
            self.memory
                .write(entry.tag_id, config, entry.timestamp_us, value, entry.quality)?;
        }
        Ok(())
    }

    /// Registers (or overrides) a tag's on-disk encoding configuration.
    /// Must be called before the tag's first write to take effect; a tag
    /// first seen without registration defaults to raw `F64` at
    /// microsecond resolution.
    pub fn register_tag(&self, tag_id: u32, config: TagConfig) {
        self.tag_configs.write().expect("tag config lock poisoned").insert(tag_id, config);
    }

    fn tag_config(&self, tag_id: u32, value_type: ValueType) -> TagConfig {
        if let Some(config) = self.tag_configs.read().expect("tag config lock poisoned").get(&tag_id) {
            return *config;
        }
        let default = TagConfig {
            value_type,
            time_unit: TimeUnit::Us,
            encoding_type: EncodingType::Raw,
            encoding_param1: 0.0,
            encoding_param2: 0.0,
        };
        self.tag_configs.write().expect("tag config lock poisoned").insert(tag_id, default);
        default
    }

    /// Appends one point: WAL first, then the in-memory buffer, flushing
    /// the tag's block if its threshold is reached (spec.md §2, §4.8).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if WAL rotation finds the next segment
    /// still unflushed, or any I/O/encode error from the write path.
    pub fn write_point(&self, tag_id: u32, timestamp_us: i64, value: Value, quality: u8) -> Result<()> {
        let config = self.tag_config(tag_id, value.value_type());
        let entry = WalEntry::new(tag_id, timestamp_us, value, quality);

        {
            let mut state = self.write_state.lock().expect("write state poisoned");
            let WriteState {
                wal,
                chunk,
                directory,
                next_chunk_id,
            } = &mut *state;
            wal.append(&entry, &mut |_segment_id, touched_tags| {
                self.write_stats.wal_rotations.fetch_add(1, Ordering::Relaxed);
                self.drain_touched_tags(chunk, directory, next_chunk_id, touched_tags)
            })?;
        }
        self.write_stats.wal_appends.fetch_add(1, Ordering::Relaxed);

        let reached_threshold = self.memory.write(tag_id, config, timestamp_us, value, quality)?;
        self.write_stats.points_written.fetch_add(1, Ordering::Relaxed);

        if reached_threshold {
            let mut state = self.write_state.lock().expect("write state poisoned");
            let WriteState {
                chunk,
                directory,
                next_chunk_id,
                ..
            } = &mut *state;
            self.flush_tag_locked(chunk, directory, next_chunk_id, tag_id)?;
        }
        Ok(())
    }

    /// Callback invoked by the WAL on rotation: best-effort drains every
    /// tag touched by the outgoing segment so it can be marked cleared.
    /// Returns `true` (segment fully drained) unless a flush failed, in
    /// which case the segment stays `FullAwaitingFlush` and is retried on
    /// the next rotation through it.
    fn drain_touched_tags(
        &self,
        chunk: &mut Chunk,
        directory: &mut Directory,
        next_chunk_id: &mut u64,
        touched_tags: &HashSet<u32>,
    ) -> bool {
        touched_tags
            .iter()
            .all(|&tag_id| self.flush_tag_locked(chunk, directory, next_chunk_id, tag_id).is_ok())
    }

    fn flush_tag_locked(
        &self,
        chunk: &mut Chunk,
        directory: &mut Directory,
        next_chunk_id: &mut u64,
        tag_id: u32,
    ) -> Result<()> {
        let Some((config, start_ts_us, records)) = self.memory.drain_tag(tag_id) else {
            return Ok(());
        };
        if records.is_empty() {
            return Ok(());
        }

        let block_index = self.allocate_block_slot(chunk, directory, next_chunk_id)?;
        block_writer::write_block(
            &self.container,
            chunk,
            directory,
            block_index,
            tag_id,
            config,
            start_ts_us,
            &records,
        )?;
        self.write_stats.blocks_flushed.fetch_add(1, Ordering::Relaxed);

        let entry = directory.entries()[block_index as usize].clone();
        self.catalog.insert_block(BlockRecord {
            chunk_id: chunk.header.chunk_id,
            block_index,
            tag_id,
            start_ts_us: entry.start_ts_us,
            end_ts_us: entry.end_ts_us,
            time_unit: entry.time_unit,
            value_type: entry.value_type,
            encoding_type: entry.encoding_type,
            encoding_param1: entry.encoding_param1,
            encoding_param2: entry.encoding_param2,
            record_count: entry.record_count,
            container_id: RAW_CONTAINER_ID,
            is_archived: false,
            archive_container_id: None,
            archive_block_index: None,
        })?;

        self.maybe_roll_for_strategy(chunk, directory, next_chunk_id)
    }

    /// Finds a free data block slot in the current chunk, rolling to a
    /// new chunk first if none remain.
    fn allocate_block_slot(
        &self,
        chunk: &mut Chunk,
        directory: &mut Directory,
        next_chunk_id: &mut u64,
    ) -> Result<u32> {
        if let Some(index) = directory.entries().iter().position(|e| !e.is_sealed()) {
            return Ok(index as u32);
        }
        self.roll_chunk(chunk, directory, next_chunk_id)?;
        directory
            .entries()
            .iter()
            .position(|e| !e.is_sealed())
            .map(|i| i as u32)
            .ok_or_else(|| Error::Internal("freshly rolled chunk has no free blocks".into()))
    }

    fn maybe_roll_for_strategy(
        &self,
        chunk: &mut Chunk,
        directory: &mut Directory,
        next_chunk_id: &mut u64,
    ) -> Result<()> {
        let should_roll = match self.config.rollover_strategy {
            RolloverStrategy::None => false,
            RolloverStrategy::SizeBased => {
                let occupied = u64::from(
                    directory.entries().iter().filter(|e| e.is_sealed()).count() as u32,
                ) * self.layout.block_size_bytes;
                self.config.rollover_size_bytes > 0 && occupied >= self.config.rollover_size_bytes
            }
            RolloverStrategy::TimeBased => {
                self.config.rollover_span_us > 0
                    && chunk.header.end_ts_us - chunk.header.start_ts_us >= self.config.rollover_span_us
            }
            RolloverStrategy::Daily => {
                const DAY_US: i64 = 24 * 3_600 * 1_000_000;
                chunk.header.start_ts_us / DAY_US != chunk.header.end_ts_us / DAY_US
            }
        };
        if should_roll && chunk.header.state() == ChunkState::Allocated {
            self.roll_chunk(chunk, directory, next_chunk_id)?;
        }
        Ok(())
    }

    /// Seals the current chunk and allocates a fresh one in its place.
    fn roll_chunk(
        &self,
        chunk: &mut Chunk,
        directory: &mut Directory,
        next_chunk_id: &mut u64,
    ) -> Result<()> {
        if chunk.header.state() == ChunkState::Allocated {
            chunk.mark_filled(&self.container)?;
        }
        if chunk.header.state() == ChunkState::Filled {
            chunk.seal(&self.container, directory.entries())?;
            log::debug!("sealed chunk {} ({} blocks)", chunk.header.chunk_id, directory.entries().iter().filter(|e| e.is_sealed()).count());
            self.catalog.insert_chunk(ChunkRecord {
                chunk_id: chunk.header.chunk_id,
                container_id: RAW_CONTAINER_ID,
                offset: chunk.offset,
                start_ts_us: chunk.header.start_ts_us,
                end_ts_us: chunk.header.end_ts_us,
                super_crc32: chunk.header.super_crc32,
                sealed: true,
                block_count: directory.entries().iter().filter(|e| e.is_sealed()).count() as u32,
            })?;
            self.write_stats.chunks_sealed.fetch_add(1, Ordering::Relaxed);
        }

        let new_chunk_id = *next_chunk_id;
        let offset = chunk_offset(&self.layout, new_chunk_id);
        self.container.preallocate(offset + self.layout.chunk_size_bytes)?;
        let mut new_chunk = Chunk::allocate(new_chunk_id, offset, self.layout);
        new_chunk.write_header(&self.container)?;
        let new_directory = Directory::new_empty(&self.layout);
        new_directory.rewrite(&self.container, offset, &self.layout)?;

        *chunk = new_chunk;
        *directory = new_directory;
        *next_chunk_id = new_chunk_id + 1;
        Ok(())
    }

    /// Forces the current chunk to seal regardless of fill level or
    /// rollover strategy, draining every pending tag buffer first.
    ///
    /// # Errors
    ///
    /// Propagates I/O and encode errors from the drain and seal.
    pub fn seal_current_chunk(&self) -> Result<()> {
        self.flush()?;
        let mut state = self.write_state.lock().expect("write state poisoned");
        let WriteState {
            chunk,
            directory,
            next_chunk_id,
            ..
        } = &mut *state;
        self.roll_chunk(chunk, directory, next_chunk_id)
    }

    /// Drains every tag's memory buffer into blocks and syncs the WAL.
    ///
    /// # Errors
    ///
    /// Propagates I/O and encode errors from any drained tag's block
    /// write.
    pub fn flush(&self) -> Result<()> {
        let drained = self.memory.drain_all();
        let mut state = self.write_state.lock().expect("write state poisoned");
        let WriteState {
            wal,
            chunk,
            directory,
            next_chunk_id,
        } = &mut *state;
        for (tag_id, config, start_ts_us, records) in drained {
            if records.is_empty() {
                continue;
            }
            let block_index = self.allocate_block_slot(chunk, directory, next_chunk_id)?;
            block_writer::write_block(
                &self.container,
                chunk,
                directory,
                block_index,
                tag_id,
                config,
                start_ts_us,
                &records,
            )?;
            self.write_stats.blocks_flushed.fetch_add(1, Ordering::Relaxed);
            let entry = directory.entries()[block_index as usize].clone();
            self.catalog.insert_block(BlockRecord {
                chunk_id: chunk.header.chunk_id,
                block_index,
                tag_id,
                start_ts_us: entry.start_ts_us,
                end_ts_us: entry.end_ts_us,
                time_unit: entry.time_unit,
                value_type: entry.value_type,
                encoding_type: entry.encoding_type,
                encoding_param1: entry.encoding_param1,
                encoding_param2: entry.encoding_param2,
                record_count: entry.record_count,
                container_id: RAW_CONTAINER_ID,
                is_archived: false,
                archive_container_id: None,
                archive_block_index: None,
            })?;
        }
        wal.sync()
    }

    /// Answers a range query by merging the memory buffer with raw and
    /// compact block reads (spec.md §4.13).
    ///
    /// # Errors
    ///
    /// Propagates catalog, I/O, checksum and decode errors.
    pub fn query_points(&self, tag_id: u32, t0: i64, t1: i64) -> Result<Vec<MemRecord>> {
        self.read_stats.queries.fetch_add(1, Ordering::Relaxed);
        let candidates = self.catalog.query_blocks_by_tag_time(tag_id, t0, t1)?;

        let mut records = Vec::new();
        for block in candidates {
            let decoded = if block.is_archived {
                self.read_stats.blocks_read_compact.fetch_add(1, Ordering::Relaxed);
                self.read_archived_block(&block)?
            } else {
                self.read_stats.blocks_read_raw.fetch_add(1, Ordering::Relaxed);
                let offset = chunk_offset(&self.layout, block.chunk_id);
                let scan = scanner::scan_chunk(&self.container, offset, self.layout)?;
                let entry = scan
                    .blocks
                    .iter()
                    .find(|e| e.block_index == block.block_index)
                    .cloned()
                    .unwrap_or_else(|| BlockDirEntry {
                        tag_id: block.tag_id,
                        block_index: block.block_index,
                        start_ts_us: block.start_ts_us,
                        end_ts_us: block.end_ts_us,
                        time_unit: block.time_unit,
                        value_type: block.value_type,
                        encoding_type: block.encoding_type,
                        encoding_param1: block.encoding_param1,
                        encoding_param2: block.encoding_param2,
                        record_count: block.record_count,
                        data_crc32: 0,
                    });
                scanner::read_block(&self.container, offset, &self.layout, &entry)?
            };
            records.extend(decoded.into_iter().filter(|r| r.timestamp_us >= t0 && r.timestamp_us <= t1));
        }

        records.extend(self.memory.snapshot_range(tag_id, t0, t1));
        records.sort_by_key(|r| r.timestamp_us);
        self.read_stats
            .records_returned
            .fetch_add(records.len() as u64, Ordering::Relaxed);
        Ok(records)
    }

    fn read_archived_block(&self, block: &BlockRecord) -> Result<Vec<MemRecord>> {
        let compact_container_id = block
            .archive_container_id
            .ok_or_else(|| Error::CorruptData("archived block missing archive_container_id".into()))?;
        let compact_block_index = block
            .archive_block_index
            .ok_or_else(|| Error::CorruptData("archived block missing archive_block_index".into()))?;
        let compact_path = self
            .config
            .data_dir
            .join(format!("compact-{compact_container_id}.cpt"));
        let mut compact = CompactContainer::open_sealed(&compact_path)?;
        let raw_bytes = compact.read_raw_block(compact_block_index)?;
        crate::block::decode(
            &raw_bytes,
            block.start_ts_us,
            block.time_unit,
            block.value_type,
            block.encoding_type,
            block.encoding_param1,
            block.encoding_param2,
            block.record_count,
        )
    }

    /// Runs one archive pass against `compact_container_id`, migrating
    /// every not-yet-archived block older than `config.archive_min_age_us`
    /// (spec.md §4.10).
    ///
    /// # Errors
    ///
    /// Propagates catalog and compact-container I/O errors.
    pub fn run_archive_pass(&self, compact_container_id: u64) -> Result<ArchiveRunReport> {
        let compact_path = self
            .config
            .data_dir
            .join(format!("compact-{compact_container_id}.cpt"));
        // Each pass writes a fresh, independently sealed compact container;
        // callers supply a new `compact_container_id` per call.
        let mut compact = CompactContainer::create(&compact_path)?;

        let archiver = Archiver {
            raw_container: &self.container,
            raw_container_id: RAW_CONTAINER_ID,
            layout: self.layout,
            catalog: self.catalog.as_ref(),
        };
        let report = archiver.run(
            compact_container_id,
            &mut compact,
            &compact_path,
            self.config.archive_min_age_us,
        )?;
        log::info!(
            "archive pass {compact_container_id}: {} archived, {} failed, ratio {:.2}",
            report.blocks_archived,
            report.blocks_failed,
            report.average_compression_ratio()
        );
        self.maintenance_stats
            .blocks_archived
            .fetch_add(u64::from(report.blocks_archived), Ordering::Relaxed);
        self.maintenance_stats
            .blocks_archive_failed
            .fetch_add(u64::from(report.blocks_failed), Ordering::Relaxed);
        Ok(report)
    }

    /// Reclaims sealed chunks whose blocks are all archived and whose
    /// data is older than `config.retention_days`. A no-op if retention is
    /// not configured.
    ///
    /// # Errors
    ///
    /// Propagates catalog and chunk I/O errors.
    pub fn run_retention(&self) -> Result<MaintenanceStats> {
        let Some(days) = self.config.retention_days else {
            return Ok(self.maintenance_stats_snapshot());
        };
        let cutoff_us = crate::time::unix_timestamp_us() - i64::from(days) * 24 * 3_600 * 1_000_000;

        let pending = self.catalog.query_blocks_for_archive(RAW_CONTAINER_ID, 0)?;
        let chunks_with_pending_blocks: HashSet<u64> = pending.iter().map(|b| b.chunk_id).collect();

        let current_chunk_id = {
            let state = self.write_state.lock().expect("write state poisoned");
            state.chunk.header.chunk_id
        };

        let mut chunk_id = 0u64;
        loop {
            let offset = chunk_offset(&self.layout, chunk_id);
            if offset + self.layout.chunk_size_bytes > self.container.len()? {
                break;
            }
            if chunk_id == current_chunk_id || chunks_with_pending_blocks.contains(&chunk_id) {
                chunk_id += 1;
                continue;
            }
            let mut chunk = Chunk::read_header(&self.container, offset, self.layout)?;
            if chunk.header.state() == ChunkState::Sealed && chunk.header.end_ts_us < cutoff_us {
                chunk.deprecate(&self.container)?;
                chunk.reclaim(&self.container)?;
                log::debug!("reclaimed chunk {chunk_id} (end_ts_us {} < cutoff {cutoff_us})", chunk.header.end_ts_us);
                self.maintenance_stats.chunks_reclaimed.fetch_add(1, Ordering::Relaxed);
            }
            chunk_id += 1;
        }

        Ok(self.maintenance_stats_snapshot())
    }

    #[must_use]
    pub fn write_stats(&self) -> WriteStats {
        WriteStats {
            points_written: self.write_stats.points_written.load(Ordering::Relaxed),
            wal_appends: self.write_stats.wal_appends.load(Ordering::Relaxed),
            wal_rotations: self.write_stats.wal_rotations.load(Ordering::Relaxed),
            blocks_flushed: self.write_stats.blocks_flushed.load(Ordering::Relaxed),
            chunks_sealed: self.write_stats.chunks_sealed.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn read_stats(&self) -> ReadStats {
        ReadStats {
            queries: self.read_stats.queries.load(Ordering::Relaxed),
            blocks_read_raw: self.read_stats.blocks_read_raw.load(Ordering::Relaxed),
            blocks_read_compact: self.read_stats.blocks_read_compact.load(Ordering::Relaxed),
            records_returned: self.read_stats.records_returned.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn maintenance_stats(&self) -> MaintenanceStats {
        self.maintenance_stats_snapshot()
    }

    fn maintenance_stats_snapshot(&self) -> MaintenanceStats {
        MaintenanceStats {
            blocks_archived: self.maintenance_stats.blocks_archived.load(Ordering::Relaxed),
            blocks_archive_failed: self.maintenance_stats.blocks_archive_failed.load(Ordering::Relaxed),
            chunks_reclaimed: self.maintenance_stats.chunks_reclaimed.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn writes_flush_and_query_round_trip() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineConfig::new(dir.path())
            .layout(1, 16)
            .flush_threshold(4)
            .open()?;

        for i in 0..10 {
            engine.write_point(1, i * 1_000, Value::F64(f64::from(i as i32)), 192)?;
        }
        engine.flush()?;

        let points = engine.query_points(1, 0, 10_000)?;
        assert_eq!(points.len(), 10);
        assert_eq!(points[0].timestamp_us, 0);
        assert_eq!(points[9].timestamp_us, 9_000);
        Ok(())
    }

    #[test]
    fn seal_current_chunk_rolls_to_a_fresh_chunk() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let engine = EngineConfig::new(dir.path()).layout(1, 16).open()?;

        engine.write_point(1, 0, Value::F64(1.0), 192)?;
        engine.seal_current_chunk()?;
        assert_eq!(engine.write_stats().chunks_sealed, 1);

        let points = engine.query_points(1, 0, 1_000)?;
        assert_eq!(points.len(), 1);
        Ok(())
    }
}
