// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! xTdb is an append-oriented time-series storage engine for industrial
//! telemetry: per-tag streams of `(timestamp, value, quality)` produced at
//! rates from 0.1 Hz to ~1 kHz.
//!
//! It persists data durably through a rotating write-ahead log, drains it
//! into extent-aligned chunks of fixed-width data blocks, compresses with
//! domain-specific encoders (Swinging-Door, Q16), ages old blocks into a
//! compressed compact container, and serves range queries that transparently
//! union in-memory, raw on-disk, and archived data.
//!
//! # Example usage
//!
//! ```
//! use xtdb::{EngineConfig, Value};
//!
//! # let dir = tempfile::tempdir()?;
//! let engine = EngineConfig::new(dir.path()).open()?;
//!
//! engine.write_point(1, 0, Value::F64(42.0), xtdb::quality::GOOD)?;
//! engine.write_point(1, 1_000, Value::F64(43.0), xtdb::quality::GOOD)?;
//! engine.flush()?;
//!
//! let points = engine.query_points(1, 0, 10_000)?;
//! assert_eq!(points.len(), 2);
//! # Ok::<(), xtdb::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, missing_docs, clippy::cargo)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

mod aligned_io;
mod archive_manager;
mod block;
mod block_writer;
mod buffer;
mod catalog;
mod checksum;
mod chunk;
mod compact;
mod compression;
mod config;
mod constants;
mod container;
mod directory;
mod engine;
mod error;
mod layout;
mod path;
mod quantized16;
mod resample;
mod scanner;
mod stats;
mod swinging_door;
mod time;
mod value;
mod wal;

pub use archive_manager::{ArchiveEntry, ArchiveManager, ArchiveQuery, Resolution};
pub use buffer::{MemRecord, MemoryBuffer, TagConfig};
pub use catalog::{BlockRecord, ChunkRecord, MemoryCatalog, MetadataCatalog};
pub use compact::{ArchiveRunReport, Archiver, BlockMeta, CompactContainer, TocEntry};
pub use config::{EngineConfig, RolloverStrategy};
pub use container::{Container, ContainerStatsSnapshot};
pub use engine::StorageEngine;
pub use error::{Error, Result};
pub use layout::Layout;
pub use resample::{resample, ResampledPoint};
pub use stats::{MaintenanceStats, ReadStats, WriteStats};
pub use value::{quality, EncodingType, TimeUnit, Value, ValueType};
