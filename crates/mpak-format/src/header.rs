//! Fixed 12-byte container header
//!
//! ```text
//! [0x00] Magic "MPK1"                          (4 bytes)
//! [0x04] CRC-32 of bytes [0x08, EOF)           (u32 LE)
//! [0x08] Absolute offset of the file table     (u32 LE)
//! ```
//!
//! The checksum covers the file table offset field, every payload byte and
//! the file table itself, so it is always the last field patched when a
//! container is finalized.

use crate::endian;
use crate::error::MpakError;
use binrw::{BinRead, BinResult, BinWrite};
use std::io::{self, Cursor, Read, Seek, Write};

/// Container magic
pub const MAGIC: [u8; 4] = *b"MPK1";

/// Size of the fixed header in bytes
pub const HEADER_SIZE: u64 = 12;

/// Position of the checksum field
pub const CHECKSUM_FIELD_POS: u64 = 4;

/// Position of the file table offset field
pub const FILE_TABLE_OFFSET_FIELD_POS: u64 = 8;

/// First byte covered by the checksum
pub const CHECKSUM_START: u64 = 8;

/// Parsed container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Magic bytes, always [`MAGIC`] once parsed
    pub magic: [u8; 4],
    /// Stored CRC-32 of `[CHECKSUM_START, EOF)`
    pub checksum: u32,
    /// Absolute offset of the file table
    pub file_table_offset: u32,
}

impl ArchiveHeader {
    /// Create a header with the given field values
    pub const fn new(checksum: u32, file_table_offset: u32) -> Self {
        Self {
            magic: MAGIC,
            checksum,
            file_table_offset,
        }
    }

    /// Header written when a container is created, before finalization
    pub const fn placeholder() -> Self {
        Self::new(0, 0)
    }

    /// Parse a header from the start of `data`
    pub fn parse(data: &[u8]) -> crate::Result<Self> {
        Ok(Self::read_le(&mut Cursor::new(data))?)
    }

    /// Serialize to the 12 on-disk bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(HEADER_SIZE as usize));
        self.write_le(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

/// Read as many bytes as are available up to `buf.len()`
fn read_available<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn custom_error<S: Seek>(stream: &mut S, err: MpakError) -> binrw::Error {
    binrw::Error::Custom {
        pos: stream.stream_position().unwrap_or(0),
        err: Box::new(err),
    }
}

impl BinRead for ArchiveHeader {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        // A file shorter than the magic is reported as a magic mismatch
        let mut magic = [0u8; 4];
        let got = read_available(reader, &mut magic)?;
        if got < magic.len() || magic != MAGIC {
            return Err(custom_error(reader, MpakError::InvalidMagic(magic)));
        }

        let mut fields = [0u8; 8];
        let got = read_available(reader, &mut fields)?;
        if got < fields.len() {
            return Err(custom_error(
                reader,
                MpakError::TruncatedHeader {
                    expected: HEADER_SIZE as usize,
                    actual: magic.len() + got,
                },
            ));
        }

        let mut fields = Cursor::new(fields);
        let checksum = endian::read_u32(&mut fields)?;
        let file_table_offset = endian::read_u32(&mut fields)?;

        Ok(Self {
            magic,
            checksum,
            file_table_offset,
        })
    }
}

impl BinWrite for ArchiveHeader {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        writer.write_all(&self.magic)?;
        endian::write_u32(writer, self.checksum)?;
        endian::write_u32(writer, self.file_table_offset)?;
        Ok(())
    }
}
