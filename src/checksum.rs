// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! CRC32C (Castagnoli) checksums: `data_crc32` on every sealed block and the
//! chunk super-CRC both use this polynomial (spec.md §3, §4.5).

/// Computes the CRC32C of a byte slice.
#[must_use]
pub fn crc32c(bytes: &[u8]) -> u32 {
    crc32c::crc32c(bytes)
}

/// Computes the CRC32C over the concatenation of several slices, without
/// allocating an intermediate buffer. Used for the chunk super-CRC, which
/// spans the chunk header fields and the directory entries.
#[must_use]
pub fn crc32c_concat(parts: &[&[u8]]) -> u32 {
    let mut state = 0u32;
    for part in parts {
        state = crc32c::crc32c_append(state, part);
    }
    state
}

/// Writer adapter that accumulates a running CRC32C as bytes pass through.
pub struct ChecksummedWriter<W: std::io::Write> {
    inner: W,
    state: u32,
}

impl<W: std::io::Write> ChecksummedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: writer,
            state: 0,
        }
    }

    pub fn checksum(&self) -> u32 {
        self.state
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: std::io::Write> std::io::Write for ChecksummedWriter<W> {
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.state = crc32c::crc32c_append(self.state, &buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn crc32c_known_vector() {
        // "123456789" is the standard CRC32C check string.
        assert_eq!(0xE307_0184, crc32c(b"123456789"));
    }

    #[test]
    fn crc32c_concat_matches_joined_buffer() {
        let a = b"hello ";
        let b = b"world";
        let mut joined = Vec::new();
        joined.extend_from_slice(a);
        joined.extend_from_slice(b);
        assert_eq!(crc32c(&joined), crc32c_concat(&[a, b]));
    }
}
