// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Rotating write-ahead log (spec.md §4.4): N pre-sized segments inside the
//! container's WAL region, append + rotation + segment-flush callback.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::constants::{
    round_up_to_extent, EXTENT_SIZE, WAL_ENTRY_SIZE, WAL_HEADER_BYTES, WAL_REGION_EXTENTS,
    WAL_REGION_START_EXTENT,
};
use crate::container::Container;
use crate::value::Value;
use crate::{Error, Result};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::Arc;

const WAL_HEADER_MAGIC: [u8; 8] = *b"XTDBWALH";
const WAL_HEADER_VERSION: u16 = 1;
const SEGMENT_DESCRIPTOR_SIZE: usize = 12;

/// A single fixed-width WAL record (spec.md §6).
#[derive(Clone, Debug, PartialEq)]
pub struct WalEntry {
    pub tag_id: u32,
    pub timestamp_us: i64,
    pub value_type: u8,
    pub quality: u8,
    pub value: [u8; 8],
}

impl WalEntry {
    #[must_use]
    pub fn new(tag_id: u32, timestamp_us: i64, value: Value, quality: u8) -> Self {
        let mut packed = [0u8; 8];
        let bytes = value.to_bytes();
        packed[..bytes.len()].copy_from_slice(&bytes);
        Self {
            tag_id,
            timestamp_us,
            value_type: value.value_type().into(),
            quality,
            value: packed,
        }
    }
}

impl Encode for WalEntry {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        writer.write_all(&self.tag_id.to_le_bytes())?;
        writer.write_all(&self.timestamp_us.to_le_bytes())?;
        writer.write_all(&[self.value_type, self.quality, 0, 0])?;
        writer.write_all(&self.value)?;
        Ok(())
    }
}

impl Decode for WalEntry {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError>
    where
        Self: Sized,
    {
        let mut buf = [0u8; WAL_ENTRY_SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self {
            tag_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            timestamp_us: i64::from_le_bytes(buf[4..12].try_into().unwrap()),
            value_type: buf[12],
            quality: buf[13],
            value: buf[16..24].try_into().unwrap(),
        })
    }
}

/// WAL segment lifecycle (spec.md §3): `CLEARED` and `EMPTY` are the same
/// state, reachable either by construction or by [`RotatingWal::clear_segment`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SegmentState {
    Empty,
    Writing,
    FullAwaitingFlush,
    Flushed,
}

impl SegmentState {
    const fn tag(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Writing => 1,
            Self::FullAwaitingFlush => 2,
            Self::Flushed => 3,
        }
    }

    fn from_tag(tag: u8) -> std::result::Result<Self, DecodeError> {
        match tag {
            0 => Ok(Self::Empty),
            1 => Ok(Self::Writing),
            2 => Ok(Self::FullAwaitingFlush),
            3 => Ok(Self::Flushed),
            other => Err(DecodeError::InvalidTag("SegmentState", other)),
        }
    }
}

/// One pre-sized rotating region. Entries are accumulated in `buffer` and
/// only reach disk in whole-extent writes, since the aligned I/O layer
/// forbids sub-extent offsets and lengths (spec.md §4.1).
struct WalSegment {
    id: u32,
    offset: u64,
    capacity_bytes: u64,
    buffer: Vec<u8>,
    write_position: u64,
    entry_count: u32,
    tag_ids_touched: HashSet<u32>,
    state: SegmentState,
}

impl WalSegment {
    fn new(id: u32, offset: u64, capacity_bytes: u64) -> Self {
        Self {
            id,
            offset,
            capacity_bytes,
            buffer: vec![0u8; capacity_bytes as usize],
            write_position: 0,
            entry_count: 0,
            tag_ids_touched: HashSet::new(),
            state: SegmentState::Empty,
        }
    }

    fn remaining(&self) -> u64 {
        self.capacity_bytes - self.write_position
    }

    fn append_bytes(&mut self, bytes: &[u8], tag_id: u32) {
        let start = self.write_position as usize;
        let end = start + bytes.len();
        self.buffer[start..end].copy_from_slice(bytes);
        self.write_position = end as u64;
        self.entry_count += 1;
        self.tag_ids_touched.insert(tag_id);
    }

    fn reset(&mut self) {
        self.write_position = 0;
        self.entry_count = 0;
        self.tag_ids_touched.clear();
        self.buffer.iter_mut().for_each(|b| *b = 0);
        self.state = SegmentState::Empty;
    }

    fn flush_to(&self, container: &Container) -> Result<()> {
        let len = round_up_to_extent(self.write_position).min(self.capacity_bytes);
        if len > 0 {
            container.write(&self.buffer[..len as usize], self.offset)?;
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<WalEntry>> {
        let mut out = Vec::with_capacity(self.entry_count as usize);
        let mut cursor = &self.buffer[..self.write_position as usize];
        for _ in 0..self.entry_count {
            out.push(WalEntry::decode_from(&mut cursor)?);
        }
        Ok(out)
    }
}

/// Per-container rotating WAL (spec.md §4.4). Owns the in-memory segment
/// buffers; the container owns the bytes once flushed.
pub struct RotatingWal {
    container: Arc<Container>,
    segments: Vec<WalSegment>,
    current: usize,
    header_offset: u64,
}

impl RotatingWal {
    /// Lays out `segment_count` equal segments across the WAL region and
    /// either initializes a fresh header or loads the persisted one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `segment_count` is zero or the
    /// region is too small to hold it.
    pub fn open(container: Arc<Container>, segment_count: u32) -> Result<Self> {
        if segment_count == 0 {
            return Err(Error::InvalidArgument("segment_count must be > 0".into()));
        }

        let header_offset = WAL_REGION_START_EXTENT * EXTENT_SIZE;
        let region_bytes = WAL_REGION_EXTENTS * EXTENT_SIZE - WAL_HEADER_BYTES;
        let segment_extents = region_bytes / EXTENT_SIZE / u64::from(segment_count);
        let segment_bytes = segment_extents * EXTENT_SIZE;
        if segment_bytes == 0 {
            return Err(Error::InvalidArgument(
                "segment_count too large for the WAL region".into(),
            ));
        }

        let mut segments = Vec::with_capacity(segment_count as usize);
        for i in 0..segment_count {
            let offset = header_offset + WAL_HEADER_BYTES + u64::from(i) * segment_bytes;
            segments.push(WalSegment::new(i, offset, segment_bytes));
        }
        segments[0].state = SegmentState::Writing;

        let mut wal = Self {
            container,
            segments,
            current: 0,
            header_offset,
        };

        if !wal.container.is_empty()? {
            wal.load_header_if_present()?;
        }

        Ok(wal)
    }

    fn load_header_if_present(&mut self) -> Result<()> {
        let mut buf = vec![0u8; EXTENT_SIZE as usize];
        self.container.read(&mut buf, self.header_offset)?;
        if buf[0..8] != WAL_HEADER_MAGIC {
            return Ok(());
        }
        let segment_count = u16::from_le_bytes([buf[10], buf[11]]) as usize;
        let mut cursor = 12usize;
        for segment in self.segments.iter_mut().take(segment_count) {
            let descriptor = &buf[cursor..cursor + SEGMENT_DESCRIPTOR_SIZE];
            segment.state = SegmentState::from_tag(descriptor[0])?;
            segment.entry_count = u32::from_le_bytes(descriptor[4..8].try_into().unwrap());
            segment.write_position =
                u64::from(u32::from_le_bytes(descriptor[8..12].try_into().unwrap()));
            cursor += SEGMENT_DESCRIPTOR_SIZE;
        }
        if let Some(idx) = self
            .segments
            .iter()
            .position(|s| s.state == SegmentState::Writing)
        {
            self.current = idx;
        }
        for segment in &mut self.segments {
            if segment.write_position > 0 {
                self.container.read(
                    &mut segment.buffer[..round_up_to_extent(segment.write_position) as usize],
                    segment.offset,
                )?;
            }
        }
        Ok(())
    }

    fn persist_header(&self) -> Result<()> {
        let mut buf = vec![0u8; EXTENT_SIZE as usize];
        buf[0..8].copy_from_slice(&WAL_HEADER_MAGIC);
        buf[8..10].copy_from_slice(&WAL_HEADER_VERSION.to_le_bytes());
        buf[10..12].copy_from_slice(&(self.segments.len() as u16).to_le_bytes());
        let mut cursor = 12usize;
        for segment in &self.segments {
            buf[cursor] = segment.state.tag();
            buf[cursor + 4..cursor + 8].copy_from_slice(&segment.entry_count.to_le_bytes());
            buf[cursor + 8..cursor + 12]
                .copy_from_slice(&(segment.write_position as u32).to_le_bytes());
            cursor += SEGMENT_DESCRIPTOR_SIZE;
        }
        self.container.write(&buf, self.header_offset)
    }

    /// Appends one entry, rotating (and invoking `flush_cb`) first if the
    /// current segment cannot fit it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] (`SegmentNotCleared`) if rotation finds the
    /// next segment is not `EMPTY`.
    pub fn append(
        &mut self,
        entry: &WalEntry,
        flush_cb: &mut dyn FnMut(u32, &HashSet<u32>) -> bool,
    ) -> Result<()> {
        let bytes = entry.encode_into_vec();
        if self.segments[self.current].remaining() < bytes.len() as u64 {
            self.rotate(flush_cb)?;
        }
        self.segments[self.current].append_bytes(&bytes, entry.tag_id);
        Ok(())
    }

    fn rotate(&mut self, flush_cb: &mut dyn FnMut(u32, &HashSet<u32>) -> bool) -> Result<()> {
        let outgoing = self.current;
        self.segments[outgoing].state = SegmentState::FullAwaitingFlush;
        self.segments[outgoing].flush_to(&self.container)?;
        self.persist_header()?;

        let next = (self.current + 1) % self.segments.len();
        if self.segments[next].state != SegmentState::Empty {
            log::warn!("wal rotation stalled: segment {next} not cleared");
            return Err(Error::Busy(format!("wal segment {next} not cleared")));
        }
        log::debug!("wal rotating segment {outgoing} -> {next}");

        let delivered = flush_cb(
            self.segments[outgoing].id,
            &self.segments[outgoing].tag_ids_touched,
        );
        if delivered {
            self.segments[outgoing].state = SegmentState::Flushed;
        }

        self.segments[next].state = SegmentState::Writing;
        self.current = next;
        self.persist_header()
    }

    /// Flushes the current segment's buffer and fsyncs the container.
    pub fn sync(&self) -> Result<()> {
        self.segments[self.current].flush_to(&self.container)?;
        self.persist_header()?;
        self.container.sync()
    }

    /// Marks a segment clear after its callback has drained the relevant
    /// tag buffers. Idempotent.
    pub fn clear_segment(&mut self, id: u32) -> Result<()> {
        let segment = self
            .segments
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("wal segment {id}")))?;
        segment.reset();
        self.persist_header()
    }

    /// Replays every segment in `WRITING` or `FULL_AWAITING_FLUSH` state,
    /// in segment id order, returning their entries for re-insertion into
    /// memory buffers before new writes are accepted (spec.md §4.4, P3).
    pub fn replay(&self) -> Result<Vec<WalEntry>> {
        let mut out = Vec::new();
        for segment in &self.segments {
            if matches!(
                segment.state,
                SegmentState::Writing | SegmentState::FullAwaitingFlush
            ) {
                out.extend(segment.entries()?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use test_log::test;

    fn open_container(dir: &tempfile::TempDir) -> Arc<Container> {
        Arc::new(Container::open_file(dir.path().join("c.raw"), true, 1024, 1).unwrap())
    }

    #[test]
    fn appends_and_replays_unflushed_entries() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let container = open_container(&dir);
        let mut wal = RotatingWal::open(container, 4)?;

        for i in 0..5 {
            let entry = WalEntry::new(7, 1000 + i, Value::F64(f64::from(i as i32)), 192);
            wal.append(&entry, &mut |_, _| true)?;
        }
        wal.sync()?;

        let replayed = wal.replay()?;
        assert_eq!(replayed.len(), 5);
        assert_eq!(replayed[0].tag_id, 7);
        Ok(())
    }

    #[test]
    fn rotation_blocks_when_next_segment_not_cleared() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let container = open_container(&dir);
        let mut wal = RotatingWal::open(container, 2)?;

        let segment_capacity = wal.segments[0].capacity_bytes;
        let entries_per_segment = segment_capacity / WAL_ENTRY_SIZE as u64;

        // Fill segment 0 and roll into segment 1.
        for i in 0..entries_per_segment + 1 {
            let entry = WalEntry::new(1, i as i64, Value::I32(i as i32), 192);
            wal.append(&entry, &mut |_, _| false)?;
        }

        // Segment 0 is FullAwaitingFlush (never cleared); filling segment 1
        // and trying to roll back into segment 0 must fail.
        let result = (0..=entries_per_segment).try_for_each(|i| {
            let entry = WalEntry::new(1, i as i64, Value::I32(i as i32), 192);
            wal.append(&entry, &mut |_, _| false)
        });
        assert!(result.is_err());
        Ok(())
    }
}
