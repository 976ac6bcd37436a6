//! Container session: open, validate, write and finalize
//!
//! A session wraps at most one container at a time and moves between three
//! states:
//!
//! ```text
//!            open_read ──► OpenForRead ──┐
//! Closed ──┤                              ├── close ──► Closed
//!            open_write ─► OpenForWrite ─┘
//! ```
//!
//! A failed open leaves the session `Closed`; nothing is recorded until the
//! header, checksum and file table have all been validated.
//!
//! # Writing
//!
//! ```rust,no_run
//! use mpak_format::ArchiveSession;
//!
//! # fn main() -> mpak_format::Result<()> {
//! let mut session = ArchiveSession::new();
//! session.open_write("assets.mpk")?;
//! session.add_member("title.png", b"...")?;
//! session.add_member("theme.ogg", b"...")?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Reading
//!
//! ```rust,no_run
//! use mpak_format::ArchiveSession;
//!
//! # fn main() -> mpak_format::Result<()> {
//! let mut session = ArchiveSession::new();
//! session.open_read("assets.mpk", Some("mods/"))?;
//! let bytes = session.read_file("title.png")?;
//! # Ok(())
//! # }
//! ```

use crate::checksum;
use crate::config::ArchiveConfig;
use crate::endian;
use crate::error::{MpakError, Result};
use crate::header::{
    ArchiveHeader, CHECKSUM_FIELD_POS, CHECKSUM_START, FILE_TABLE_OFFSET_FIELD_POS, HEADER_SIZE,
};
use crate::index::{ArchiveIndex, IndexEntry, IndexRecord, validate_name};
use binrw::{BinRead, BinWrite};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Observable lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// No container open
    Closed,
    /// Container validated and indexed
    OpenForRead,
    /// Container being written
    OpenForWrite,
}

/// State held while a container is open for reading
#[derive(Debug)]
pub(crate) struct ReadState {
    pub path: PathBuf,
    pub index: ArchiveIndex,
    pub override_dir: Option<PathBuf>,
    pub checksum: u32,
}

/// State held while a container is being written
#[derive(Debug)]
struct WriteState {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Offset the next payload byte lands at
    position: u64,
    records: Vec<IndexRecord>,
    names: HashSet<String>,
}

#[derive(Debug)]
enum SessionState {
    Closed,
    Read(ReadState),
    Write(WriteState),
}

/// One container at a time, opened for reading or writing
#[derive(Debug)]
pub struct ArchiveSession {
    config: ArchiveConfig,
    state: SessionState,
}

impl Default for ArchiveSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSession {
    /// Create a closed session with default limits
    pub fn new() -> Self {
        Self {
            config: ArchiveConfig::default(),
            state: SessionState::Closed,
        }
    }

    /// Create a closed session with custom limits
    pub fn with_config(config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: SessionState::Closed,
        })
    }

    /// Session configuration
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn mode(&self) -> SessionMode {
        match self.state {
            SessionState::Closed => SessionMode::Closed,
            SessionState::Read(_) => SessionMode::OpenForRead,
            SessionState::Write(_) => SessionMode::OpenForWrite,
        }
    }

    /// Whether a container is open in either mode
    pub fn is_open(&self) -> bool {
        !matches!(self.state, SessionState::Closed)
    }

    /// Path of the open container
    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            SessionState::Closed => None,
            SessionState::Read(state) => Some(&state.path),
            SessionState::Write(state) => Some(&state.path),
        }
    }

    /// Open and validate a container for reading
    ///
    /// `override_dir` is a prefix that member names are appended to verbatim
    /// when resolving overrides, so it normally ends with a path separator.
    /// When `None`, the configured default (if any) is used.
    pub fn open_read<P, O>(&mut self, path: P, override_dir: Option<O>) -> Result<()>
    where
        P: AsRef<Path>,
        O: AsRef<Path>,
    {
        if self.is_open() {
            return Err(MpakError::AlreadyOpen);
        }

        let path = path.as_ref();
        let file = File::open(path).map_err(|source| MpakError::CannotOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = ArchiveHeader::read_le(&mut reader)?;

        let actual = checksum::crc32_from_offset(&mut reader, CHECKSUM_START)?;
        if actual != header.checksum {
            return Err(MpakError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        reader.seek(SeekFrom::Start(u64::from(header.file_table_offset)))?;
        let index =
            ArchiveIndex::parse(&mut reader, header.file_table_offset, file_len, &self.config)?;
        // Payload reads open their own handles
        drop(reader);

        let override_dir = override_dir
            .map(|dir| dir.as_ref().to_path_buf())
            .or_else(|| self.config.override_dir.clone());

        info!(
            "Opened {} ({} members, {} payload bytes, checksum {:#010x})",
            path.display(),
            index.len(),
            index.total_payload_size(),
            header.checksum
        );
        if let Some(dir) = &override_dir {
            debug!("Override prefix: {}", dir.display());
        }

        self.state = SessionState::Read(ReadState {
            path: path.to_path_buf(),
            index,
            override_dir,
            checksum: header.checksum,
        });
        Ok(())
    }

    /// Create or truncate a container and prepare it for appending members
    pub fn open_write<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.is_open() {
            return Err(MpakError::AlreadyOpen);
        }

        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| MpakError::CannotOpen {
                path: path.to_path_buf(),
                source,
            })?;

        let mut writer = BufWriter::new(file);
        ArchiveHeader::placeholder().write_le(&mut writer)?;

        debug!("Created {} for writing", path.display());

        self.state = SessionState::Write(WriteState {
            path: path.to_path_buf(),
            writer,
            position: HEADER_SIZE,
            records: Vec::new(),
            names: HashSet::new(),
        });
        Ok(())
    }

    /// Append a member from memory
    pub fn add_member(&mut self, name: &str, data: &[u8]) -> Result<IndexEntry> {
        self.add_member_from_reader(name, &mut &data[..])
    }

    /// Append a member read from a file on disk
    pub fn add_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<IndexEntry> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| MpakError::CannotOpen {
            path: path.to_path_buf(),
            source,
        })?;
        self.add_member_from_reader(name, &mut BufReader::new(file))
    }

    /// Append a member by streaming `reader` to its end
    pub fn add_member_from_reader<R: Read>(
        &mut self,
        name: &str,
        reader: &mut R,
    ) -> Result<IndexEntry> {
        let Self { config, state } = self;
        let SessionState::Write(state) = state else {
            return Err(MpakError::NotOpenForWrite);
        };

        validate_name(name, config.max_name_len)?;
        if state.names.contains(name) {
            return Err(MpakError::DuplicateMember(name.to_string()));
        }
        if state.records.len() >= config.max_members {
            return Err(MpakError::TooManyMembers {
                count: state.records.len() as u64 + 1,
                max: config.max_members,
            });
        }
        let offset =
            u32::try_from(state.position).map_err(|_| MpakError::ArchiveTooLarge(state.position))?;

        let copied = match io::copy(reader, &mut state.writer) {
            Ok(n) => n,
            Err(e) => {
                // Rewind so the next member overwrites the partial payload
                state.writer.seek(SeekFrom::Start(state.position))?;
                return Err(e.into());
            }
        };

        let end = state.position + copied;
        if u32::try_from(end).is_err() {
            state.writer.seek(SeekFrom::Start(state.position))?;
            return Err(MpakError::ArchiveTooLarge(end));
        }

        state.position = end;
        state.names.insert(name.to_string());
        state.records.push(IndexRecord {
            name: name.as_bytes().to_vec(),
            offset,
        });

        debug!("Added '{}' at {:#x} ({} bytes)", name, offset, copied);

        Ok(IndexEntry {
            name: name.as_bytes().to_vec(),
            offset,
            size: copied as u32,
        })
    }

    /// Close the container
    ///
    /// A container open for writing is finalized first: the file table is
    /// appended, its offset patched into the header, and the checksum of
    /// `[8, EOF)` patched in last. The session is closed afterwards even if
    /// finalization fails. Closing a closed session is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Closed => Ok(()),
            SessionState::Read(state) => {
                debug!("Closed {}", state.path.display());
                Ok(())
            }
            SessionState::Write(state) => finalize(state),
        }
    }

    /// File table of the container open for reading
    pub fn index(&self) -> Option<&ArchiveIndex> {
        match &self.state {
            SessionState::Read(state) => Some(&state.index),
            _ => None,
        }
    }

    /// Slot of `name` in the file table
    pub fn find<N: AsRef<[u8]>>(&self, name: N) -> Result<Option<usize>> {
        Ok(self.read_state()?.index.find(name))
    }

    /// Whether the container itself holds `name`, ignoring overrides
    pub fn contains<N: AsRef<[u8]>>(&self, name: N) -> bool {
        self.index().is_some_and(|index| index.contains(name))
    }

    /// Checksum stored in the open container's header
    pub fn checksum(&self) -> Option<u32> {
        match &self.state {
            SessionState::Read(state) => Some(state.checksum),
            _ => None,
        }
    }

    /// Override prefix in effect for the open container
    pub fn override_dir(&self) -> Option<&Path> {
        match &self.state {
            SessionState::Read(state) => state.override_dir.as_deref(),
            _ => None,
        }
    }

    /// Number of members written so far, or indexed when reading
    pub fn member_count(&self) -> usize {
        match &self.state {
            SessionState::Closed => 0,
            SessionState::Read(state) => state.index.len(),
            SessionState::Write(state) => state.records.len(),
        }
    }

    pub(crate) fn read_state(&self) -> Result<&ReadState> {
        match &self.state {
            SessionState::Read(state) => Ok(state),
            _ => Err(MpakError::NotOpenForRead),
        }
    }
}

impl Drop for ArchiveSession {
    fn drop(&mut self) {
        if let SessionState::Write(state) = &self.state {
            warn!(
                "Container {} dropped without close(); file table and checksum were not written",
                state.path.display()
            );
        }
    }
}

fn finalize(state: WriteState) -> Result<()> {
    let WriteState {
        path,
        mut writer,
        position,
        records,
        ..
    } = state;

    let file_table_offset =
        u32::try_from(position).map_err(|_| MpakError::ArchiveTooLarge(position))?;
    let index = ArchiveIndex::from_records(records, file_table_offset)?;

    writer.seek(SeekFrom::Start(position))?;
    index.write_to(&mut writer)?;
    let end = position + index.table_size();

    let mut file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    // Drop anything left behind by a failed append
    file.set_len(end)?;

    file.seek(SeekFrom::Start(FILE_TABLE_OFFSET_FIELD_POS))?;
    endian::write_u32(&mut file, file_table_offset)?;

    let checksum = checksum::crc32_from_offset(&mut BufReader::new(&file), CHECKSUM_START)?;
    file.seek(SeekFrom::Start(CHECKSUM_FIELD_POS))?;
    endian::write_u32(&mut file, checksum)?;
    file.sync_all()?;

    info!(
        "Finalized {} ({} members, file table at {:#x}, checksum {:#010x})",
        path.display(),
        index.len(),
        file_table_offset,
        checksum
    );
    Ok(())
}
