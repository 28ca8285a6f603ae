// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Layout calculator (spec.md §4.2): derives `{meta_blocks, data_blocks}`
//! for a chunk from its block and chunk sizes, by fixed-point iteration.

use crate::constants::{is_extent_aligned, BLOCK_DIR_ENTRY_SIZE, CHUNK_HEADER_SIZE};
use crate::{Error, Result};

/// A chunk's derived geometry. Pure function of `(block_size_bytes,
/// chunk_size_bytes)`, so callers are expected to compute it once per
/// distinct pair and cache the result (the engine keeps one per container).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Layout {
    pub chunk_size_bytes: u64,
    pub block_size_bytes: u64,
    pub meta_blocks: u64,
    pub data_blocks: u64,
    pub blocks_per_chunk: u64,
}

impl Layout {
    /// Computes a chunk's layout, iterating `meta_blocks` to a fixed point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if either size is not extent
    /// aligned, or if `block_size_bytes > chunk_size_bytes`.
    pub fn compute(block_size_bytes: u64, chunk_size_bytes: u64) -> Result<Self> {
        if !is_extent_aligned(block_size_bytes) || !is_extent_aligned(chunk_size_bytes) {
            return Err(Error::InvalidArgument(format!(
                "block_size_bytes ({block_size_bytes}) and chunk_size_bytes ({chunk_size_bytes}) must be extent-aligned"
            )));
        }
        if block_size_bytes > chunk_size_bytes {
            return Err(Error::InvalidArgument(format!(
                "block_size_bytes ({block_size_bytes}) cannot exceed chunk_size_bytes ({chunk_size_bytes})"
            )));
        }

        let blocks_per_chunk = chunk_size_bytes / block_size_bytes;
        let mut data_blocks = blocks_per_chunk;
        let mut meta_blocks = 0u64;

        for _ in 0..10 {
            let directory_bytes =
                CHUNK_HEADER_SIZE as u64 + data_blocks * BLOCK_DIR_ENTRY_SIZE as u64;
            let next_meta_blocks = directory_bytes.div_ceil(block_size_bytes).max(1);
            let next_data_blocks = blocks_per_chunk.saturating_sub(next_meta_blocks);

            if next_meta_blocks == meta_blocks {
                break;
            }
            meta_blocks = next_meta_blocks;
            data_blocks = next_data_blocks;
        }

        if meta_blocks == 0 || meta_blocks >= blocks_per_chunk {
            return Err(Error::InvalidArgument(format!(
                "chunk_size_bytes ({chunk_size_bytes}) too small to hold a directory for block_size_bytes ({block_size_bytes})"
            )));
        }

        Ok(Self {
            chunk_size_bytes,
            block_size_bytes,
            meta_blocks,
            data_blocks,
            blocks_per_chunk,
        })
    }

    #[must_use]
    pub const fn data_block_offset(&self, data_block_index: u64) -> u64 {
        (self.meta_blocks + data_block_index) * self.block_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn converges_for_realistic_sizes() {
        let layout = Layout::compute(16_384, 16 * 1024 * 1024).unwrap();
        assert_eq!(layout.blocks_per_chunk, 1024);
        assert!(layout.meta_blocks >= 1);
        assert_eq!(layout.meta_blocks + layout.data_blocks, layout.blocks_per_chunk);
    }

    #[test]
    fn rejects_unaligned_sizes() {
        assert!(Layout::compute(16_383, 16 * 1024 * 1024).is_err());
        assert!(Layout::compute(16_384, 16 * 1024 * 1024 + 1).is_err());
    }

    #[test]
    fn rejects_block_larger_than_chunk() {
        assert!(Layout::compute(32_768, 16_384).is_err());
    }
}
