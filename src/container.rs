// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Container (spec.md §3, §4.3, §6): a fixed-layout byte store with a
//! header at extent 0, a reserved WAL region, then a chunk array.

use crate::aligned_io::{AlignedIo, BlockDeviceIo, FileIo};
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::constants::{
    CONTAINER_MAGIC, CONTAINER_VERSION, EXTENT_SIZE, WAL_REGION_EXTENTS, WAL_REGION_START_EXTENT,
};
use crate::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// RAW_FIXED is the only layout this crate implements; the field exists on
/// disk so a future layout can be introduced without a format break.
pub const LAYOUT_RAW_FIXED: u8 = 0;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CapacityType {
    Dynamic,
    Fixed,
}

impl From<CapacityType> for u8 {
    fn from(value: CapacityType) -> Self {
        match value {
            CapacityType::Dynamic => 0,
            CapacityType::Fixed => 1,
        }
    }
}

impl TryFrom<u8> for CapacityType {
    type Error = DecodeError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dynamic),
            1 => Ok(Self::Fixed),
            other => Err(DecodeError::InvalidTag("CapacityType", other)),
        }
    }
}

/// Bit-exact extent-0 header (spec.md §6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    pub db_instance_id: [u8; 16],
    pub layout: u8,
    pub capacity_type: CapacityType,
    pub archive_level: u8,
    pub raw_block_class: u8,
    pub capacity_extents: u64,
    pub chunk_size_extents: u32,
    pub block_size_extents: u32,
    pub created_ts_us: i64,
}

impl ContainerHeader {
    #[must_use]
    pub fn new(
        capacity_extents: u64,
        chunk_size_extents: u32,
        block_size_extents: u32,
        created_ts_us: i64,
    ) -> Self {
        Self {
            db_instance_id: *uuid::Uuid::new_v4().as_bytes(),
            layout: LAYOUT_RAW_FIXED,
            capacity_type: CapacityType::Dynamic,
            archive_level: 0,
            raw_block_class: 1,
            capacity_extents,
            chunk_size_extents,
            block_size_extents,
            created_ts_us,
        }
    }
}

impl Encode for ContainerHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        let mut buf = [0u8; EXTENT_SIZE as usize];
        buf[0..8].copy_from_slice(&CONTAINER_MAGIC);
        buf[8..10].copy_from_slice(&CONTAINER_VERSION.to_le_bytes());
        buf[10..12].copy_from_slice(&(EXTENT_SIZE as u16).to_le_bytes());
        buf[12..28].copy_from_slice(&self.db_instance_id);
        buf[28] = self.layout;
        buf[29] = self.capacity_type.into();
        buf[30] = self.archive_level;
        buf[31] = self.raw_block_class;
        buf[32..40].copy_from_slice(&self.capacity_extents.to_le_bytes());
        buf[40..44].copy_from_slice(&self.chunk_size_extents.to_le_bytes());
        buf[44..48].copy_from_slice(&self.block_size_extents.to_le_bytes());
        buf[48..56].copy_from_slice(&self.created_ts_us.to_le_bytes());
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl Decode for ContainerHeader {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError>
    where
        Self: Sized,
    {
        let mut buf = [0u8; EXTENT_SIZE as usize];
        reader.read_exact(&mut buf)?;

        if buf[0..8] != CONTAINER_MAGIC {
            return Err(DecodeError::InvalidMagic("ContainerHeader"));
        }
        let version = u16::from_le_bytes([buf[8], buf[9]]);
        if version != CONTAINER_VERSION {
            return Err(DecodeError::InvalidTag("ContainerHeader.version", buf[9]));
        }

        let mut db_instance_id = [0u8; 16];
        db_instance_id.copy_from_slice(&buf[12..28]);

        Ok(Self {
            db_instance_id,
            layout: buf[28],
            capacity_type: CapacityType::try_from(buf[29])?,
            archive_level: buf[30],
            raw_block_class: buf[31],
            capacity_extents: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            chunk_size_extents: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
            block_size_extents: u32::from_le_bytes(buf[44..48].try_into().unwrap()),
            created_ts_us: i64::from_le_bytes(buf[48..56].try_into().unwrap()),
        })
    }
}

/// Running I/O counters, one set per open container.
#[derive(Default)]
pub struct ContainerStats {
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub read_ops: AtomicU64,
    pub write_ops: AtomicU64,
    pub sync_ops: AtomicU64,
}

impl ContainerStats {
    #[must_use]
    pub fn snapshot(&self) -> ContainerStatsSnapshot {
        ContainerStatsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            read_ops: self.read_ops.load(Ordering::Relaxed),
            write_ops: self.write_ops.load(Ordering::Relaxed),
            sync_ops: self.sync_ops.load(Ordering::Relaxed),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ContainerStatsSnapshot {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub sync_ops: u64,
}

/// A fixed-layout byte store: header, WAL region, chunk array, reachable
/// through either a plain file or a raw block device.
pub struct Container {
    io: Box<dyn AlignedIo>,
    header: ContainerHeader,
    stats: ContainerStats,
}

impl Container {
    /// Opens (optionally creating) a file-backed container.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptData`] if the header magic/version does not
    /// match and `create_if_missing` is false, or any underlying I/O error.
    pub fn open_file<P: AsRef<Path>>(
        path: P,
        create_if_missing: bool,
        chunk_size_extents: u32,
        block_size_extents: u32,
    ) -> Result<Self> {
        let io = FileIo::open(&path, create_if_missing, false)?;
        Self::open_with_io(Box::new(io), create_if_missing, chunk_size_extents, block_size_extents)
    }

    /// Opens a raw block device as a container. `preallocate` becomes a
    /// no-op and capacity is derived from the device's current size.
    pub fn open_block_device<P: AsRef<Path>>(
        path: P,
        chunk_size_extents: u32,
        block_size_extents: u32,
    ) -> Result<Self> {
        let io = BlockDeviceIo::open(&path)?;
        Self::open_with_io(Box::new(io), false, chunk_size_extents, block_size_extents)
    }

    fn open_with_io(
        io: Box<dyn AlignedIo>,
        create_if_missing: bool,
        chunk_size_extents: u32,
        block_size_extents: u32,
    ) -> Result<Self> {
        let stats = ContainerStats::default();
        let is_fresh = io.is_empty()?;

        let header = if is_fresh {
            if !create_if_missing {
                return Err(Error::NotFound("container header absent".into()));
            }
            let header = ContainerHeader::new(
                WAL_REGION_START_EXTENT + WAL_REGION_EXTENTS,
                chunk_size_extents,
                block_size_extents,
                crate::time::unix_timestamp_us(),
            );
            io.preallocate((WAL_REGION_START_EXTENT + WAL_REGION_EXTENTS) * EXTENT_SIZE)?;
            let bytes = header.encode_into_vec();
            io.write(&bytes, 0)?;
            let zeros = vec![0u8; (WAL_REGION_EXTENTS * EXTENT_SIZE) as usize];
            io.write(&zeros, WAL_REGION_START_EXTENT * EXTENT_SIZE)?;
            io.sync()?;
            header
        } else {
            let mut buf = vec![0u8; EXTENT_SIZE as usize];
            io.read(&mut buf, 0)?;
            ContainerHeader::decode_from(&mut buf.as_slice())?
        };

        Ok(Self { io, header, stats })
    }

    #[must_use]
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    #[must_use]
    pub fn stats(&self) -> ContainerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn read(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.io.read(buf, offset)?;
        self.stats.bytes_read.fetch_add(buf.len() as u64, Ordering::Relaxed);
        self.stats.read_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn write(&self, buf: &[u8], offset: u64) -> Result<()> {
        self.io.write(buf, offset)?;
        self.stats.bytes_written.fetch_add(buf.len() as u64, Ordering::Relaxed);
        self.stats.write_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()?;
        self.stats.sync_ops.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn preallocate(&self, size: u64) -> Result<()> {
        self.io.preallocate(size)
    }

    pub fn len(&self) -> Result<u64> {
        self.io.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.io.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn creates_and_reopens_header() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.raw");

        let created_id = {
            let container = Container::open_file(&path, true, 1024, 1)?;
            container.header().db_instance_id
        };

        let reopened = Container::open_file(&path, false, 1024, 1)?;
        assert_eq!(reopened.header().db_instance_id, created_id);
        assert_eq!(reopened.header().chunk_size_extents, 1024);
        Ok(())
    }

    #[test]
    fn refuses_missing_header_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.raw");
        assert!(Container::open_file(&path, false, 1024, 1).is_err());
    }
}
