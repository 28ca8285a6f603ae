// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Counters surfaced by [`crate::engine::StorageEngine`] for operational
//! visibility, mirroring the container-level counters in `container.rs`.

/// Write-path counters since engine open.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub points_written: u64,
    pub wal_appends: u64,
    pub wal_rotations: u64,
    pub blocks_flushed: u64,
    pub chunks_sealed: u64,
}

/// Read-path counters since engine open.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub queries: u64,
    pub blocks_read_raw: u64,
    pub blocks_read_compact: u64,
    pub records_returned: u64,
}

/// Maintenance (archival, reclaim) counters since engine open.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceStats {
    pub blocks_archived: u64,
    pub blocks_archive_failed: u64,
    pub chunks_reclaimed: u64,
}
