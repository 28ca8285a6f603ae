// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Zstandard compression for the compact container (spec.md §4.10). RAW
//! containers never compress; COMPACT payloads always do.

use crate::Error;

/// Compresses a raw block payload at the given Zstandard level.
pub fn compress(data: &[u8], level: i32) -> crate::Result<Vec<u8>> {
    zstd::bulk::compress(data, level).map_err(|e| Error::Internal(format!("zstd compress: {e}")))
}

/// Decompresses a payload, given the original uncompressed size (stored in
/// the TOC entry, so the decoder never needs to guess a buffer size).
pub fn decompress(data: &[u8], original_size: usize) -> crate::Result<Vec<u8>> {
    zstd::bulk::decompress(data, original_size)
        .map_err(|e| Error::Internal(format!("zstd decompress: {e}")))
}

/// Default Zstandard level used by the archiver, matching zstd's own
/// library default rather than picking an arbitrary number.
pub const DEFAULT_LEVEL: i32 = zstd::DEFAULT_COMPRESSION_LEVEL as i32;

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn round_trip() -> crate::Result<()> {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(64);
        let compressed = compress(&data, DEFAULT_LEVEL)?;
        assert!(compressed.len() < data.len());
        let decompressed = decompress(&compressed, data.len())?;
        assert_eq!(data, decompressed);
        Ok(())
    }
}
