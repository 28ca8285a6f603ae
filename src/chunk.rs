// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Chunk header and the chunk sealer / state mutator (spec.md §3, §4.5,
//! §6): a torn-write-safe state machine built from single-bit-clear
//! transitions over a flags byte.

use crate::checksum::crc32c_concat;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::constants::{CHUNK_HEADER_SIZE, CHUNK_MAGIC, CHUNK_VERSION};
use crate::container::Container;
use crate::directory::BlockDirEntry;
use crate::layout::Layout;
use crate::{Error, Result};
use std::io::{Read, Write};

/// A chunk's lifecycle stage, derived from the highest set bit of the
/// flags byte (spec.md §4.5). A fresh chunk (`0b1111_1111`) is `Free`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChunkState {
    Free,
    Allocated,
    Filled,
    Sealed,
    Deprecated,
    Reclaimed,
}

const BIT_FREE: u8 = 0b1000_0000;
const BIT_ALLOCATED: u8 = 0b0100_0000;
const BIT_FILLED: u8 = 0b0010_0000;
const BIT_SEALED: u8 = 0b0001_0000;
const BIT_DEPRECATED: u8 = 0b0000_1000;
const BIT_RECLAIMED: u8 = 0b0000_0100;

/// Flags byte for a just-allocated chunk array slot.
pub const FRESH_FLAGS: u8 = 0xFF;

impl ChunkState {
    #[must_use]
    pub const fn from_flags(flags: u8) -> Self {
        if flags & BIT_FREE != 0 {
            Self::Free
        } else if flags & BIT_ALLOCATED != 0 {
            Self::Allocated
        } else if flags & BIT_FILLED != 0 {
            Self::Filled
        } else if flags & BIT_SEALED != 0 {
            Self::Sealed
        } else if flags & BIT_DEPRECATED != 0 {
            Self::Deprecated
        } else {
            Self::Reclaimed
        }
    }

    const fn next_bit_to_clear(self) -> Option<u8> {
        match self {
            Self::Free => Some(BIT_FREE),
            Self::Allocated => Some(BIT_ALLOCATED),
            Self::Filled => Some(BIT_FILLED),
            Self::Sealed => Some(BIT_SEALED),
            Self::Deprecated => Some(BIT_DEPRECATED),
            Self::Reclaimed => None,
        }
    }
}

/// Applies one lifecycle advance to `flags`, clearing exactly the next bit
/// in sequence. Rejects any delta that would set a bit the old byte had
/// cleared (spec.md I4).
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the chunk is already `Reclaimed`.
pub fn advance(flags: u8) -> Result<u8> {
    let state = ChunkState::from_flags(flags);
    let bit = state
        .next_bit_to_clear()
        .ok_or_else(|| Error::InvalidArgument("chunk already reclaimed".into()))?;
    let new_flags = flags & !bit;
    assert_eq!(new_flags & !flags, 0, "state mutator set a bit the old byte had cleared");
    Ok(new_flags)
}

/// Rejects `new_flags` if it sets any bit that `old_flags` had already
/// cleared, independent of [`advance`] — used when validating a
/// caller-supplied flags byte read back from disk.
#[must_use]
pub const fn is_monotonic(old_flags: u8, new_flags: u8) -> bool {
    new_flags & !old_flags == 0
}

/// Chunk header at block 0 of every chunk (spec.md §6).
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkHeader {
    pub flags: u8,
    pub chunk_id: u64,
    pub chunk_size_extents: u32,
    pub block_size_extents: u32,
    pub meta_blocks: u32,
    pub data_blocks: u32,
    pub start_ts_us: i64,
    pub end_ts_us: i64,
    pub super_crc32: u32,
}

impl ChunkHeader {
    #[must_use]
    pub fn fresh(chunk_id: u64, layout: &Layout) -> Self {
        Self {
            flags: FRESH_FLAGS,
            chunk_id,
            chunk_size_extents: (layout.chunk_size_bytes / crate::constants::EXTENT_SIZE) as u32,
            block_size_extents: (layout.block_size_bytes / crate::constants::EXTENT_SIZE) as u32,
            meta_blocks: layout.meta_blocks as u32,
            data_blocks: layout.data_blocks as u32,
            start_ts_us: 0,
            end_ts_us: 0,
            super_crc32: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ChunkState {
        ChunkState::from_flags(self.flags)
    }

    /// Bytes covered by the super-CRC: every header field except the CRC
    /// itself (spec.md §4.5).
    pub(crate) fn crc_covered_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE - 4);
        buf.extend_from_slice(&CHUNK_MAGIC);
        buf.extend_from_slice(&CHUNK_VERSION.to_le_bytes());
        buf.push(self.flags);
        buf.extend_from_slice(&self.chunk_id.to_le_bytes());
        buf.extend_from_slice(&self.chunk_size_extents.to_le_bytes());
        buf.extend_from_slice(&self.block_size_extents.to_le_bytes());
        buf.extend_from_slice(&self.meta_blocks.to_le_bytes());
        buf.extend_from_slice(&self.data_blocks.to_le_bytes());
        buf.extend_from_slice(&self.start_ts_us.to_le_bytes());
        buf.extend_from_slice(&self.end_ts_us.to_le_bytes());
        buf
    }
}

impl Encode for ChunkHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        let covered = self.crc_covered_bytes();
        buf[..covered.len()].copy_from_slice(&covered);
        buf[covered.len()..covered.len() + 4].copy_from_slice(&self.super_crc32.to_le_bytes());
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl Decode for ChunkHeader {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError>
    where
        Self: Sized,
    {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        if buf[0..8] != CHUNK_MAGIC {
            return Err(DecodeError::InvalidMagic("ChunkHeader"));
        }
        let version = u16::from_le_bytes([buf[8], buf[9]]);
        if version != CHUNK_VERSION {
            return Err(DecodeError::InvalidTag("ChunkHeader.version", buf[9]));
        }
        Ok(Self {
            flags: buf[10],
            chunk_id: u64::from_le_bytes(buf[11..19].try_into().unwrap()),
            chunk_size_extents: u32::from_le_bytes(buf[19..23].try_into().unwrap()),
            block_size_extents: u32::from_le_bytes(buf[23..27].try_into().unwrap()),
            meta_blocks: u32::from_le_bytes(buf[27..31].try_into().unwrap()),
            data_blocks: u32::from_le_bytes(buf[31..35].try_into().unwrap()),
            start_ts_us: i64::from_le_bytes(buf[35..43].try_into().unwrap()),
            end_ts_us: i64::from_le_bytes(buf[43..51].try_into().unwrap()),
            super_crc32: u32::from_le_bytes(buf[51..55].try_into().unwrap()),
        })
    }
}

/// A chunk being managed through its lifecycle: allocation, fill, seal.
pub struct Chunk {
    pub offset: u64,
    pub layout: Layout,
    pub header: ChunkHeader,
}

impl Chunk {
    #[must_use]
    pub fn allocate(chunk_id: u64, offset: u64, layout: Layout) -> Self {
        let mut header = ChunkHeader::fresh(chunk_id, &layout);
        header.flags = advance(header.flags).expect("fresh chunk can always allocate");
        header.start_ts_us = crate::time::unix_timestamp_us();
        Self { offset, layout, header }
    }

    pub fn write_header(&self, container: &Container) -> Result<()> {
        let mut buf = self.header.encode_into_vec();
        buf.resize(self.layout.block_size_bytes as usize, 0);
        container.write(&buf, self.offset)
    }

    pub fn read_header(container: &Container, offset: u64, layout: Layout) -> Result<Self> {
        let mut buf = vec![0u8; layout.block_size_bytes as usize];
        container.read(&mut buf, offset)?;
        let header = ChunkHeader::decode_from(&mut buf.as_slice())?;
        Ok(Self { offset, layout, header })
    }

    /// Marks the chunk as fully written (`Allocated` → `Filled`).
    pub fn mark_filled(&mut self, container: &Container) -> Result<()> {
        self.header.flags = advance(self.header.flags)?;
        self.write_header(container)
    }

    /// Chunk sealing sequence (spec.md §4.5): directory has already been
    /// finalized by the block writer, so this only needs to stamp the
    /// chunk's final time range, compute the super-CRC, clear the SEALED
    /// bit, and sync.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the chunk is not `Filled`.
    pub fn seal(&mut self, container: &Container, directory: &[BlockDirEntry]) -> Result<()> {
        if self.header.state() != ChunkState::Filled {
            return Err(Error::InvalidArgument(
                "chunk must be Filled before it can be sealed".into(),
            ));
        }

        if let Some(first) = directory.iter().filter(|e| e.is_sealed()).map(|e| e.start_ts_us).min()
        {
            self.header.start_ts_us = first;
        }
        if let Some(last) = directory.iter().filter(|e| e.is_sealed()).map(|e| e.end_ts_us).max() {
            self.header.end_ts_us = last;
        }

        let directory_bytes: Vec<u8> = directory.iter().flat_map(BlockDirEntry::encode_into_vec).collect();
        let header_bytes = self.header.crc_covered_bytes();
        self.header.super_crc32 = crc32c_concat(&[&header_bytes, &directory_bytes]);

        self.header.flags = advance(self.header.flags)?;
        self.write_header(container)?;
        container.sync()
    }

    pub fn deprecate(&mut self, container: &Container) -> Result<()> {
        self.header.flags = advance(self.header.flags)?;
        self.write_header(container)
    }

    pub fn reclaim(&mut self, container: &Container) -> Result<()> {
        self.header.flags = advance(self.header.flags)?;
        self.write_header(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{EncodingType, TimeUnit, ValueType};
    use test_log::test;

    #[test]
    fn state_decodes_highest_set_bit() {
        assert_eq!(ChunkState::from_flags(0xFF), ChunkState::Free);
        assert_eq!(ChunkState::from_flags(0b0111_1111), ChunkState::Allocated);
        assert_eq!(ChunkState::from_flags(0b0011_1111), ChunkState::Filled);
        assert_eq!(ChunkState::from_flags(0b0001_1111), ChunkState::Sealed);
        assert_eq!(ChunkState::from_flags(0b0000_1111), ChunkState::Deprecated);
        assert_eq!(ChunkState::from_flags(0b0000_0111), ChunkState::Reclaimed);
    }

    #[test]
    fn advance_walks_the_full_lifecycle() {
        let mut flags = FRESH_FLAGS;
        for expected in [
            ChunkState::Allocated,
            ChunkState::Filled,
            ChunkState::Sealed,
            ChunkState::Deprecated,
            ChunkState::Reclaimed,
        ] {
            flags = advance(flags).unwrap();
            assert_eq!(ChunkState::from_flags(flags), expected);
        }
        assert!(advance(flags).is_err());
    }

    #[test]
    fn monotonic_check_rejects_bit_set() {
        assert!(is_monotonic(0b0111_1111, 0b0011_1111));
        assert!(!is_monotonic(0b0011_1111, 0b0111_1111));
    }

    #[test]
    fn seal_rejects_non_filled_chunk() {
        let layout = Layout::compute(16_384, 16 * 1024 * 1024).unwrap();
        let mut chunk = Chunk::allocate(0, 0, layout);
        let dir = vec![BlockDirEntry::unsealed(1, 0)];
        assert!(chunk.seal(&dummy_container(), &dir).is_err());
        let _ = ValueType::F64;
        let _ = TimeUnit::Us;
        let _ = EncodingType::Raw;
    }

    fn dummy_container() -> Container {
        let dir = tempfile::tempdir().unwrap();
        Container::open_file(dir.path().join("c.raw"), true, 1024, 1).unwrap()
    }
}
