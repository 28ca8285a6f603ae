// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `BlockDirEntry` (spec.md §3, §6): one fixed 64-byte record per data
//! block, held in the chunk's meta blocks.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::constants::{BLOCK_DIR_ENTRY_SIZE, UNSEALED_RECORD_COUNT};
use crate::value::{EncodingType, TimeUnit, ValueType};
use std::io::{Read, Write};

/// One data block's placement and decode parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockDirEntry {
    pub tag_id: u32,
    pub block_index: u32,
    pub start_ts_us: i64,
    pub end_ts_us: i64,
    pub time_unit: TimeUnit,
    pub value_type: ValueType,
    pub encoding_type: EncodingType,
    pub encoding_param1: f32,
    pub encoding_param2: f32,
    pub record_count: u32,
    pub data_crc32: u32,
}

impl BlockDirEntry {
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.record_count != UNSEALED_RECORD_COUNT
    }

    /// An entry for a data block that has not been written yet.
    #[must_use]
    pub fn unsealed(tag_id: u32, block_index: u32) -> Self {
        Self {
            tag_id,
            block_index,
            start_ts_us: 0,
            end_ts_us: 0,
            time_unit: TimeUnit::Us,
            value_type: ValueType::F64,
            encoding_type: EncodingType::Raw,
            encoding_param1: 0.0,
            encoding_param2: 0.0,
            record_count: UNSEALED_RECORD_COUNT,
            data_crc32: 0,
        }
    }
}

impl Encode for BlockDirEntry {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        let mut buf = [0u8; BLOCK_DIR_ENTRY_SIZE];
        buf[0..4].copy_from_slice(&self.tag_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.block_index.to_le_bytes());
        buf[8..16].copy_from_slice(&self.start_ts_us.to_le_bytes());
        buf[16..24].copy_from_slice(&self.end_ts_us.to_le_bytes());
        buf[24] = self.time_unit.tag();
        buf[25] = self.value_type.into();
        buf[26] = self.encoding_type.tag();
        buf[27] = 0; // padding
        buf[28..32].copy_from_slice(&self.encoding_param1.to_le_bytes());
        buf[32..36].copy_from_slice(&self.encoding_param2.to_le_bytes());
        buf[36..40].copy_from_slice(&self.record_count.to_le_bytes());
        buf[40..44].copy_from_slice(&self.data_crc32.to_le_bytes());
        // buf[44..64] stays zero (reserved).
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl Decode for BlockDirEntry {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError>
    where
        Self: Sized,
    {
        let mut buf = [0u8; BLOCK_DIR_ENTRY_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self {
            tag_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            block_index: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            start_ts_us: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            end_ts_us: i64::from_le_bytes(buf[16..24].try_into().unwrap()),
            time_unit: TimeUnit::from_tag(buf[24])?,
            value_type: ValueType::try_from(buf[25])?,
            encoding_type: EncodingType::from_tag(buf[26])?,
            encoding_param1: f32::from_le_bytes(buf[28..32].try_into().unwrap()),
            encoding_param2: f32::from_le_bytes(buf[32..36].try_into().unwrap()),
            record_count: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
            data_crc32: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn unsealed_round_trips() {
        let entry = BlockDirEntry::unsealed(42, 7);
        let bytes = entry.encode_into_vec();
        assert_eq!(bytes.len(), BLOCK_DIR_ENTRY_SIZE);
        let decoded = BlockDirEntry::decode_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, entry);
        assert!(!decoded.is_sealed());
    }

    #[test]
    fn sealed_round_trips() {
        let entry = BlockDirEntry {
            tag_id: 1,
            block_index: 2,
            start_ts_us: 1_000,
            end_ts_us: 2_000,
            time_unit: TimeUnit::Ms,
            value_type: ValueType::F32,
            encoding_type: EncodingType::SwingingDoor,
            encoding_param1: 1.5,
            encoding_param2: -2.5,
            record_count: 10,
            data_crc32: 0xDEAD_BEEF,
        };
        let bytes = entry.encode_into_vec();
        let decoded = BlockDirEntry::decode_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, entry);
        assert!(decoded.is_sealed());
    }
}
