// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Raw scanner / block reader (spec.md §4.7): reconstructs a chunk's
//! directory from disk and decodes individual blocks back to records.

use crate::block;
use crate::block_writer::Directory;
use crate::buffer::MemRecord;
use crate::checksum::{crc32c, crc32c_concat};
use crate::chunk::{Chunk, ChunkState};
use crate::coding::Encode;
use crate::container::Container;
use crate::directory::BlockDirEntry;
use crate::layout::Layout;
use crate::{Error, Result};

/// What the raw scanner reports about one chunk.
pub struct ChunkScan {
    pub chunk_id: u64,
    pub start_ts_us: i64,
    pub end_ts_us: i64,
    pub is_sealed: bool,
    pub blocks: Vec<BlockDirEntry>,
}

/// Reads a chunk's header and directory region, verifying magic, version,
/// and (if sealed) the super-CRC (spec.md §4.7).
///
/// # Errors
///
/// Returns [`Error::CorruptData`] if the chunk magic/version is wrong, or
/// if the chunk is sealed and its super-CRC does not match.
pub fn scan_chunk(container: &Container, chunk_offset: u64, layout: Layout) -> Result<ChunkScan> {
    let chunk = Chunk::read_header(container, chunk_offset, layout)?;
    let directory = Directory::read(container, chunk_offset, &layout)?;
    let is_sealed = matches!(
        chunk.header.state(),
        ChunkState::Sealed | ChunkState::Deprecated
    );

    if is_sealed {
        let header_bytes = chunk.header.crc_covered_bytes();
        let directory_bytes: Vec<u8> = directory
            .entries()
            .iter()
            .flat_map(BlockDirEntry::encode_into_vec)
            .collect();
        let computed = crc32c_concat(&[&header_bytes, &directory_bytes]);
        if computed != chunk.header.super_crc32 {
            return Err(Error::CorruptData(format!(
                "chunk {} super-CRC mismatch: expected {:#010x}, computed {:#010x}",
                chunk.header.chunk_id, chunk.header.super_crc32, computed
            )));
        }
    }

    Ok(ChunkScan {
        chunk_id: chunk.header.chunk_id,
        start_ts_us: chunk.header.start_ts_us,
        end_ts_us: chunk.header.end_ts_us,
        is_sealed,
        blocks: directory
            .entries()
            .iter()
            .filter(|e| e.is_sealed())
            .cloned()
            .collect(),
    })
}

/// Reads one data block, verifies its `data_crc32`, and decodes it per
/// `entry.encoding_type` (spec.md §4.7).
///
/// # Errors
///
/// Returns [`Error::CorruptData`] on a checksum mismatch or malformed
/// payload.
pub fn read_block(
    container: &Container,
    chunk_offset: u64,
    layout: &Layout,
    entry: &BlockDirEntry,
) -> Result<Vec<MemRecord>> {
    let block_size = layout.block_size_bytes as usize;
    let mut buf = vec![0u8; block_size];
    let offset = chunk_offset + layout.data_block_offset(u64::from(entry.block_index));
    container.read(&mut buf, offset)?;

    let computed = crc32c(&buf);
    if computed != entry.data_crc32 {
        return Err(Error::CorruptData(format!(
            "block {} data_crc32 mismatch: expected {:#010x}, computed {:#010x}",
            entry.block_index, entry.data_crc32, computed
        )));
    }

    block::decode(
        &buf,
        entry.start_ts_us,
        entry.time_unit,
        entry.value_type,
        entry.encoding_type,
        entry.encoding_param1,
        entry.encoding_param2,
        entry.record_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_writer::write_block;
    use crate::buffer::TagConfig;
    use crate::value::{EncodingType, TimeUnit, Value, ValueType};
    use test_log::test;

    #[test]
    fn scans_and_reads_back_a_written_block() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let container = Container::open_file(dir.path().join("c.raw"), true, 1024, 1)?;
        let layout = Layout::compute(16_384, 16 * 1024 * 1024)?;
        container.preallocate(layout.chunk_size_bytes)?;

        let mut chunk = Chunk::allocate(0, 0, layout);
        chunk.write_header(&container)?;
        let mut directory = crate::block_writer::Directory::new_empty(&layout);

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
        write_block(&container, &chunk, &mut directory, 0, 1, config, 0, &records)?;

        let scan = scan_chunk(&container, chunk.offset, layout)?;
        assert_eq!(scan.blocks.len(), 1);
        assert!(!scan.is_sealed);

        let decoded = read_block(&container, chunk.offset, &layout, &scan.blocks[0])?;
        assert_eq!(decoded, records);
        Ok(())
    }
}
