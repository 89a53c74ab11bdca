//! Streaming checksums
//!
//! Shared integrity primitive for parts and whole assets. Checksums are
//! accumulated incrementally so multi-gigabyte files never need to be
//! held in memory.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Buffer size for streaming file reads (1 MiB).
const READ_BUF_LEN: usize = 1024 * 1024;

/// Incrementally accumulated CRC32 checksum.
#[derive(Debug, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    /// Create a new empty accumulator.
    pub fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Feed the next run of bytes into the checksum.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Consume the accumulator and return the final checksum.
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// Compute the CRC32 of an entire file by streaming it in fixed-size reads.
pub fn file_crc32<P: AsRef<Path>>(path: P) -> io::Result<u32> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Crc32::new();
    let mut buf = vec![0u8; READ_BUF_LEN];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_streaming_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";

        let mut hasher = Crc32::new();
        hasher.update(&data[..10]);
        hasher.update(&data[10..]);

        assert_eq!(hasher.finalize(), crc32fast::hash(data));
    }

    #[test]
    fn test_empty_input() {
        let hasher = Crc32::new();
        assert_eq!(hasher.finalize(), crc32fast::hash(b""));
    }

    #[test]
    fn test_file_crc32() {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let crc = file_crc32(file.path()).unwrap();
        assert_eq!(crc, crc32fast::hash(&data));
    }

    #[test]
    fn test_file_crc32_missing_file() {
        let result = file_crc32("/this/path/does/not/exist");
        assert!(result.is_err());
    }
}
