// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block writer / directory builder (spec.md §4.6): drains a tag buffer
//! into one data block and keeps the chunk's directory region consistent.

use crate::block::{self, EncodeParams};
use crate::buffer::{MemRecord, TagConfig};
use crate::checksum::crc32c;
use crate::chunk::Chunk;
use crate::coding::{Decode, Encode};
use crate::container::Container;
use crate::constants::BLOCK_DIR_ENTRY_SIZE;
use crate::directory::BlockDirEntry;
use crate::layout::Layout;
use crate::{Error, Result};

/// A chunk's directory, held in memory by the writer that owns the chunk
/// and mirrored to disk on every block seal (spec.md §4.6 step 6).
pub struct Directory {
    entries: Vec<BlockDirEntry>,
}

impl Directory {
    #[must_use]
    pub fn new_empty(layout: &Layout) -> Self {
        let entries = (0..layout.data_blocks as u32)
            .map(|i| BlockDirEntry::unsealed(0, i))
            .collect();
        Self { entries }
    }

    /// Reconstructs a directory by reading the meta blocks at `chunk_offset`.
    pub fn read(container: &Container, chunk_offset: u64, layout: &Layout) -> Result<Self> {
        let directory_bytes = (layout.meta_blocks - 1) * layout.block_size_bytes;
        let mut buf = vec![0u8; directory_bytes as usize];
        if directory_bytes > 0 {
            container.read(&mut buf, chunk_offset + layout.block_size_bytes)?;
        }
        let mut entries = Vec::with_capacity(layout.data_blocks as usize);
        let mut cursor = buf.as_slice();
        for _ in 0..layout.data_blocks {
            entries.push(BlockDirEntry::decode_from(&mut cursor)?);
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[BlockDirEntry] {
        &self.entries
    }

    pub fn set(&mut self, data_block_index: u32, entry: BlockDirEntry) {
        self.entries[data_block_index as usize] = entry;
    }

    /// Rewrites the whole extent-aligned directory region (spec.md §4.6
    /// step 6): acceptable because directories are small, and it sidesteps
    /// any torn-partial-entry case.
    pub fn rewrite(&self, container: &Container, chunk_offset: u64, layout: &Layout) -> Result<()> {
        let directory_region_bytes = (layout.meta_blocks - 1) * layout.block_size_bytes;
        if directory_region_bytes == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; directory_region_bytes as usize];
        for (i, entry) in self.entries.iter().enumerate() {
            let bytes = entry.encode_into_vec();
            let start = i * BLOCK_DIR_ENTRY_SIZE;
            buf[start..start + BLOCK_DIR_ENTRY_SIZE].copy_from_slice(&bytes);
        }
        container.write(&buf, chunk_offset + layout.block_size_bytes)?;
        container.sync()
    }
}

/// Drains `records` into data block `data_block_index` of `chunk`, updates
/// `directory` in memory, and rewrites the directory region on disk
/// (spec.md §4.6).
///
/// On any I/O failure the directory entry is left/returned as unsealed
/// (`record_count = 0xFFFFFFFF`); the caller's WAL still has the records,
/// so a restart can reproduce the block via replay.
///
/// # Errors
///
/// Propagates I/O and encode errors. A Q16 value out of range surfaces as
/// [`Error::InvalidArgument`] and the directory entry is left unsealed.
pub fn write_block(
    container: &Container,
    chunk: &Chunk,
    directory: &mut Directory,
    data_block_index: u32,
    tag_id: u32,
    config: TagConfig,
    start_ts_us: i64,
    records: &[MemRecord],
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let params = EncodeParams {
        start_ts_us,
        time_unit: config.time_unit,
        value_type: config.value_type,
        encoding_type: config.encoding_type,
        encoding_param1: config.encoding_param1,
        encoding_param2: config.encoding_param2,
    };

    let encoded = match block::encode(records, &params) {
        Ok(e) => e,
        Err(e) => {
            directory.set(data_block_index, BlockDirEntry::unsealed(tag_id, data_block_index));
            return Err(e);
        }
    };

    let block_size = chunk.layout.block_size_bytes as usize;
    if encoded.payload.len() > block_size {
        return Err(Error::InvalidArgument(format!(
            "encoded block for tag {tag_id} ({} bytes) exceeds block size ({block_size} bytes)",
            encoded.payload.len()
        )));
    }

    let mut buf = vec![0u8; block_size];
    buf[..encoded.payload.len()].copy_from_slice(&encoded.payload);
    let data_crc32 = crc32c(&buf);

    let block_offset = chunk.offset + chunk.layout.data_block_offset(u64::from(data_block_index));
    container.write(&buf, block_offset)?;

    let last_record = records.last().expect("checked non-empty above");
    let end_ts_us = last_record.timestamp_us;

    let entry = BlockDirEntry {
        tag_id,
        block_index: data_block_index,
        start_ts_us,
        end_ts_us,
        time_unit: config.time_unit,
        value_type: config.value_type,
        encoding_type: config.encoding_type,
        encoding_param1: config.encoding_param1,
        encoding_param2: config.encoding_param2,
        record_count: encoded.record_count,
        data_crc32,
    };
    directory.set(data_block_index, entry);
    directory.rewrite(container, chunk.offset, &chunk.layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::value::{EncodingType, TimeUnit, Value, ValueType};
    use test_log::test;

    #[test]
    fn writes_block_and_directory_entry() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let container = Container::open_file(dir.path().join("c.raw"), true, 1024, 1)?;
        let layout = Layout::compute(16_384, 16 * 1024 * 1024)?;
        container.preallocate(layout.chunk_size_bytes)?;

        let chunk = Chunk::allocate(0, 0, layout);
        let mut directory = Directory::new_empty(&layout);

        let records: Vec<_> = (0..5)
            .map(|i| MemRecord {
                timestamp_us: i * 1_000,
                value: Value::F64(f64::from(i as i32)),
                quality: 192,
            })
            .collect();

        let config = TagConfig {
            value_type: ValueType::F64,
            time_unit: TimeUnit::Us,
            encoding_type: EncodingType::Raw,
            encoding_param1: 0.0,
            encoding_param2: 0.0,
        };

        write_block(&container, &chunk, &mut directory, 0, 42, config, 0, &records)?;

        let entry = &directory.entries()[0];
        assert!(entry.is_sealed());
        assert_eq!(entry.record_count, 5);
        assert_eq!(entry.tag_id, 42);

        let reloaded = Directory::read(&container, chunk.offset, &layout)?;
        assert_eq!(reloaded.entries()[0], *entry);
        Ok(())
    }
}
