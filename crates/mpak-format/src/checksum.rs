//! Table-driven CRC-32 used to guard container integrity
//!
//! This is the reflected CRC-32 (polynomial `0xEDB88320`, seed `0xFFFFFFFF`,
//! final complement) used by zlib, PNG and ZIP. The 256-entry lookup table is
//! built on first use and shared by every session in the process.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::LazyLock;

/// Reflected generator polynomial
pub const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Buffer size used when digesting streams
pub const STREAM_BUFFER_SIZE: usize = 16 * 1024;

static CRC_TABLE: LazyLock<[u32; 256]> = LazyLock::new(build_table);

fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let mut crc = i as u32;
        for _ in 0..8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
        }
        *slot = crc;
    }
    table
}

/// Shared lookup table
pub fn table() -> &'static [u32; 256] {
    &CRC_TABLE
}

/// Streaming CRC-32 digest
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    state: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    /// Start a new digest
    pub const fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    /// Fold `data` into the digest
    pub fn update(&mut self, data: &[u8]) {
        let table = table();
        let mut crc = self.state;
        for &byte in data {
            crc = (crc >> 8) ^ table[((crc ^ u32::from(byte)) & 0xFF) as usize];
        }
        self.state = crc;
    }

    /// Finish the digest
    pub const fn finalize(self) -> u32 {
        self.state ^ 0xFFFF_FFFF
    }
}

/// CRC-32 of a byte slice
pub fn crc32(data: &[u8]) -> u32 {
    let mut digest = Crc32::new();
    digest.update(data);
    digest.finalize()
}

/// CRC-32 of everything remaining in `reader`
pub fn crc32_reader<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut digest = Crc32::new();
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        digest.update(&buffer[..n]);
    }
    Ok(digest.finalize())
}

/// CRC-32 of `[offset, EOF)`
///
/// Leaves the reader positioned at end of stream.
pub fn crc32_from_offset<R: Read + Seek>(reader: &mut R, offset: u64) -> io::Result<u32> {
    reader.seek(SeekFrom::Start(offset))?;
    crc32_reader(reader)
}
