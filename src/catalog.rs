// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Metadata catalog interface (spec.md §4.14): the core treats the catalog
//! as an external relation, touched only through this trait. [`MemoryCatalog`]
//! is the in-process reference implementation used by tests and by callers
//! with no external SQL store available (spec.md §9: "treat the catalog as
//! an interface so an implementation can choose any durable relation").

use crate::value::{EncodingType, TimeUnit, ValueType};
use crate::Result;
use std::sync::RwLock;

/// One sealed chunk's placement, as recorded at seal time.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkRecord {
    pub chunk_id: u64,
    pub container_id: u64,
    pub offset: u64,
    pub start_ts_us: i64,
    pub end_ts_us: i64,
    pub super_crc32: u32,
    pub sealed: bool,
    pub block_count: u32,
}

/// One data block's placement and decode parameters, as seen by the
/// planner. `is_archived` and the `archive_*` fields are set only after
/// [`MetadataCatalog::mark_archived`].
#[derive(Clone, Debug, PartialEq)]
pub struct BlockRecord {
    pub chunk_id: u64,
    pub block_index: u32,
    pub tag_id: u32,
    pub start_ts_us: i64,
    pub end_ts_us: i64,
    pub time_unit: TimeUnit,
    pub value_type: ValueType,
    pub encoding_type: EncodingType,
    pub encoding_param1: f32,
    pub encoding_param2: f32,
    pub record_count: u32,
    pub container_id: u64,
    pub is_archived: bool,
    pub archive_container_id: Option<u64>,
    pub archive_block_index: Option<u32>,
}

/// External catalog contract (spec.md §4.14). Every method is documented
/// as atomic per call; implementations backed by a real database should
/// wrap each in its own transaction.
pub trait MetadataCatalog: Send + Sync {
    /// Records a newly sealed (or sealing) chunk.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the in-memory reference never fails.
    fn insert_chunk(&self, record: ChunkRecord) -> Result<()>;

    /// Records (or replaces) one data block's placement.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the in-memory reference never fails.
    fn insert_block(&self, record: BlockRecord) -> Result<()>;

    /// Blocks for `tag_id` whose `[start_ts_us, end_ts_us]` overlaps
    /// `[t0, t1]`, indexed by `(tag_id, start_ts_us, end_ts_us)`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the in-memory reference never fails.
    fn query_blocks_by_tag_time(&self, tag_id: u32, t0: i64, t1: i64) -> Result<Vec<BlockRecord>>;

    /// Not-yet-archived blocks in `container_id` whose `end_ts_us` is at
    /// least `min_age_us` old, indexed by `(container_id, is_archived)`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the in-memory reference never fails.
    fn query_blocks_for_archive(
        &self,
        container_id: u64,
        min_age_us: i64,
    ) -> Result<Vec<BlockRecord>>;

    /// Atomically marks a block archived, pointing at its compact
    /// container placement. Called only after the compact append has been
    /// fsynced (spec.md I6).
    ///
    /// # Errors
    ///
    /// Implementation-defined; the in-memory reference never fails.
    fn mark_archived(
        &self,
        chunk_id: u64,
        block_index: u32,
        compact_container_id: u64,
        compact_block_index: u32,
    ) -> Result<()>;
}

/// In-memory reference catalog. Linear scans stand in for the indexes
/// spec.md §4.14 requires; fine for tests and small deployments, not a
/// substitute for a real indexed store at scale.
#[derive(Default)]
pub struct MemoryCatalog {
    chunks: RwLock<Vec<ChunkRecord>>,
    blocks: RwLock<Vec<BlockRecord>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataCatalog for MemoryCatalog {
    fn insert_chunk(&self, record: ChunkRecord) -> Result<()> {
        let mut chunks = self.chunks.write().expect("catalog lock poisoned");
        if let Some(existing) = chunks.iter_mut().find(|c| c.chunk_id == record.chunk_id) {
            *existing = record;
        } else {
            chunks.push(record);
        }
        Ok(())
    }

    fn insert_block(&self, record: BlockRecord) -> Result<()> {
        let mut blocks = self.blocks.write().expect("catalog lock poisoned");
        if let Some(existing) = blocks
            .iter_mut()
            .find(|b| b.chunk_id == record.chunk_id && b.block_index == record.block_index)
        {
            *existing = record;
        } else {
            blocks.push(record);
        }
        Ok(())
    }

    fn query_blocks_by_tag_time(&self, tag_id: u32, t0: i64, t1: i64) -> Result<Vec<BlockRecord>> {
        let blocks = self.blocks.read().expect("catalog lock poisoned");
        Ok(blocks
            .iter()
            .filter(|b| b.tag_id == tag_id && b.start_ts_us <= t1 && b.end_ts_us >= t0)
            .cloned()
            .collect())
    }

    fn query_blocks_for_archive(
        &self,
        container_id: u64,
        min_age_us: i64,
    ) -> Result<Vec<BlockRecord>> {
        let now_us = crate::time::unix_timestamp_us();
        let blocks = self.blocks.read().expect("catalog lock poisoned");
        Ok(blocks
            .iter()
            .filter(|b| {
                b.container_id == container_id
                    && !b.is_archived
                    && now_us - b.end_ts_us >= min_age_us
            })
            .cloned()
            .collect())
    }

    fn mark_archived(
        &self,
        chunk_id: u64,
        block_index: u32,
        compact_container_id: u64,
        compact_block_index: u32,
    ) -> Result<()> {
        let mut blocks = self.blocks.write().expect("catalog lock poisoned");
        if let Some(block) = blocks
            .iter_mut()
            .find(|b| b.chunk_id == chunk_id && b.block_index == block_index)
        {
            block.is_archived = true;
            block.archive_container_id = Some(compact_container_id);
            block.archive_block_index = Some(compact_block_index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn record(tag_id: u32, t0: i64, t1: i64) -> BlockRecord {
        BlockRecord {
            chunk_id: 0,
            block_index: 0,
            tag_id,
            start_ts_us: t0,
            end_ts_us: t1,
            time_unit: TimeUnit::Us,
            value_type: ValueType::F64,
            encoding_type: EncodingType::Raw,
            encoding_param1: 0.0,
            encoding_param2: 0.0,
            record_count: 10,
            container_id: 1,
            is_archived: false,
            archive_container_id: None,
            archive_block_index: None,
        }
    }

    #[test]
    fn query_by_tag_time_filters_overlap() -> Result<()> {
        let catalog = MemoryCatalog::new();
        catalog.insert_block(record(1, 0, 1_000))?;
        catalog.insert_block(record(1, 2_000, 3_000))?;
        catalog.insert_block(record(2, 0, 1_000))?;

        let hits = catalog.query_blocks_by_tag_time(1, 500, 2_500)?;
        assert_eq!(hits.len(), 2);
        Ok(())
    }

    #[test]
    fn mark_archived_sets_pointer() -> Result<()> {
        let catalog = MemoryCatalog::new();
        catalog.insert_block(record(1, 0, 1_000))?;
        catalog.mark_archived(0, 0, 99, 7)?;
        let hits = catalog.query_blocks_by_tag_time(1, 0, 1_000)?;
        assert!(hits[0].is_archived);
        assert_eq!(hits[0].archive_container_id, Some(99));
        assert_eq!(hits[0].archive_block_index, Some(7));
        Ok(())
    }
}
