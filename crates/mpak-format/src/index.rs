//! Trailing file table
//!
//! ```text
//! @file_table_offset:
//!   [u32 LE]  member count N
//!   N times:
//!     [u8]      name length L
//!     [L bytes] name
//!     [u32 LE]  absolute payload offset
//! ```
//!
//! Member sizes are never stored. Payloads are contiguous and in table order,
//! so each size is the distance to the next member's offset, and the last
//! member ends where the file table begins.
//!
//! Names are kept as the raw bytes stored on disk and matched byte for byte.
//! Only their length is checked when reading; writers additionally require
//! non-empty UTF-8 names (see [`validate_name`]).

use crate::config::{ArchiveConfig, FORMAT_MAX_NAME_LEN};
use crate::endian;
use crate::error::{MpakError, Result};
use crate::header::HEADER_SIZE;
use binrw::{BinRead, BinResult, BinWrite};
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Seek, Write};
use tracing::debug;

/// Size of the member count field
pub const COUNT_FIELD_SIZE: u64 = 4;

/// One member of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Member name bytes as stored
    pub name: Vec<u8>,
    /// Absolute offset of the payload
    pub offset: u32,
    /// Payload length, derived from neighbouring offsets
    pub size: u32,
}

impl IndexEntry {
    /// Name as UTF-8, if it is
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    /// Name for display, with invalid UTF-8 replaced
    pub fn display_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Offset one past the last payload byte
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }

    /// Bytes this entry occupies in the file table
    pub fn record_size(&self) -> u64 {
        1 + self.name.len() as u64 + 4
    }
}

/// A file table record as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexRecord {
    pub name: Vec<u8>,
    pub offset: u32,
}

fn name_too_long(name: &[u8], max: usize) -> MpakError {
    MpakError::NameTooLong {
        name: String::from_utf8_lossy(name).into_owned(),
        len: name.len(),
        max,
    }
}

impl BinRead for IndexRecord {
    /// Maximum accepted name length
    type Args<'a> = usize;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: binrw::Endian,
        max_name_len: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;

        let mut len = [0u8; 1];
        reader.read_exact(&mut len)?;
        let len = usize::from(len[0]);

        let mut name = vec![0u8; len];
        reader.read_exact(&mut name)?;
        let offset = endian::read_u32(reader)?;

        let max = max_name_len.min(FORMAT_MAX_NAME_LEN);
        if name.len() > max {
            return Err(binrw::Error::Custom {
                pos,
                err: Box::new(name_too_long(&name, max)),
            });
        }

        Ok(Self { name, offset })
    }
}

impl BinWrite for IndexRecord {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        let len = u8::try_from(self.name.len()).map_err(|_| binrw::Error::Custom {
            pos: writer.stream_position().unwrap_or(0),
            err: Box::new(name_too_long(&self.name, FORMAT_MAX_NAME_LEN)),
        })?;
        writer.write_all(&[len])?;
        writer.write_all(&self.name)?;
        endian::write_u32(writer, self.offset)?;
        Ok(())
    }
}

/// Check a name before it is written to a new container
pub fn validate_name(name: &str, max_name_len: usize) -> Result<()> {
    if name.is_empty() {
        return Err(MpakError::EmptyName);
    }
    let max = max_name_len.min(FORMAT_MAX_NAME_LEN);
    if name.len() > max {
        return Err(name_too_long(name.as_bytes(), max));
    }
    Ok(())
}

fn invalid(reason: String) -> MpakError {
    MpakError::InvalidIndex { reason }
}

/// A table that ends early is corrupt, not an I/O failure
fn truncated_as_invalid(err: MpakError) -> MpakError {
    match err {
        MpakError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            invalid(format!("file table truncated: {e}"))
        }
        other => other,
    }
}

/// Parsed file table with name lookup
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    entries: Vec<IndexEntry>,
    lookup: HashMap<Vec<u8>, usize>,
    file_table_offset: u32,
}

impl ArchiveIndex {
    /// Parse the file table
    ///
    /// `reader` must be positioned at `file_table_offset`. `file_len` is the
    /// total container length and bounds the table position.
    pub fn parse<R: Read + Seek>(
        reader: &mut R,
        file_table_offset: u32,
        file_len: u64,
        config: &ArchiveConfig,
    ) -> Result<Self> {
        let table_pos = u64::from(file_table_offset);
        if table_pos < HEADER_SIZE || table_pos + COUNT_FIELD_SIZE > file_len {
            return Err(invalid(format!(
                "file table offset {table_pos:#x} outside [{HEADER_SIZE:#x}, {:#x}]",
                file_len.saturating_sub(COUNT_FIELD_SIZE)
            )));
        }

        let count = endian::read_u32(reader).map_err(|e| truncated_as_invalid(e.into()))?;
        if count as usize > config.max_members {
            return Err(MpakError::TooManyMembers {
                count: u64::from(count),
                max: config.max_members,
            });
        }

        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let record =
                IndexRecord::read_options(reader, binrw::Endian::Little, config.max_name_len)
                    .map_err(|e| truncated_as_invalid(e.into()))?;
            records.push(record);
        }

        Self::from_records(records, file_table_offset)
    }

    /// Build an index from records in table order
    ///
    /// Validates offsets and derives every member size. Later records with a
    /// repeated name take over that name in the lookup.
    pub(crate) fn from_records(records: Vec<IndexRecord>, file_table_offset: u32) -> Result<Self> {
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(records.len());
        let mut lookup = HashMap::with_capacity(records.len());

        let mut previous = HEADER_SIZE as u32;
        for (i, record) in records.into_iter().enumerate() {
            if u64::from(record.offset) < HEADER_SIZE || record.offset > file_table_offset {
                return Err(invalid(format!(
                    "member '{}' offset {:#x} outside payload region [{HEADER_SIZE:#x}, {file_table_offset:#x}]",
                    String::from_utf8_lossy(&record.name),
                    record.offset
                )));
            }
            if record.offset < previous {
                return Err(invalid(format!(
                    "member '{}' offset {:#x} precedes previous offset {previous:#x}",
                    String::from_utf8_lossy(&record.name),
                    record.offset
                )));
            }
            previous = record.offset;

            if let Some(shadowed) = lookup.insert(record.name.clone(), i) {
                debug!(
                    "Member '{}' at slot {} shadows slot {}",
                    String::from_utf8_lossy(&record.name),
                    i,
                    shadowed
                );
            }
            entries.push(IndexEntry {
                name: record.name,
                offset: record.offset,
                size: 0,
            });
        }

        // Offsets are validated as non-decreasing and bounded by the table
        let ends: Vec<u32> = entries
            .iter()
            .skip(1)
            .map(|e| e.offset)
            .chain(std::iter::once(file_table_offset))
            .collect();
        for (entry, end) in entries.iter_mut().zip(ends) {
            entry.size = end - entry.offset;
        }

        Ok(Self {
            entries,
            lookup,
            file_table_offset,
        })
    }

    /// Slot of the member currently bound to `name`
    pub fn find<N: AsRef<[u8]>>(&self, name: N) -> Option<usize> {
        self.lookup.get(name.as_ref()).copied()
    }

    /// Member at `slot`
    pub fn get(&self, slot: usize) -> Option<&IndexEntry> {
        self.entries.get(slot)
    }

    /// Member currently bound to `name`
    pub fn entry<N: AsRef<[u8]>>(&self, name: N) -> Option<&IndexEntry> {
        self.find(name).and_then(|slot| self.get(slot))
    }

    /// Whether `name` resolves to a member
    pub fn contains<N: AsRef<[u8]>>(&self, name: N) -> bool {
        self.lookup.contains_key(name.as_ref())
    }

    /// All members in table order, including shadowed duplicates
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Iterate over members in table order
    pub fn iter(&self) -> std::slice::Iter<'_, IndexEntry> {
        self.entries.iter()
    }

    /// Name bytes in table order, including shadowed duplicates
    pub fn names(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|e| e.name.as_slice())
    }

    /// Number of records in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no records
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absolute offset of the file table
    pub fn file_table_offset(&self) -> u32 {
        self.file_table_offset
    }

    /// Sum of all payload sizes
    pub fn total_payload_size(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.size)).sum()
    }

    /// Serialized size of the file table
    pub fn table_size(&self) -> u64 {
        COUNT_FIELD_SIZE + self.entries.iter().map(IndexEntry::record_size).sum::<u64>()
    }

    /// Serialize the file table
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(self.table_size() as usize));
        let count = u32::try_from(self.entries.len()).map_err(|_| MpakError::TooManyMembers {
            count: self.entries.len() as u64,
            max: u32::MAX as usize,
        })?;
        endian::write_u32(&mut cursor, count)?;
        for entry in &self.entries {
            IndexRecord {
                name: entry.name.clone(),
                offset: entry.offset,
            }
            .write_le(&mut cursor)?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the file table to `writer`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ArchiveIndex {
    type Item = &'a IndexEntry;
    type IntoIter = std::slice::Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
