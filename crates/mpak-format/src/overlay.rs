//! Member resolution with override directory support, and extraction
//!
//! When a session has an override prefix, `<prefix><name>` is tried before
//! the container. An override file replaces the member completely; its
//! length is the file's length, not the container member's.
//!
//! Every call returns its own [`MemberHandle`] carrying the byte source and
//! the length, so concurrent opens on a shared `&ArchiveSession` never
//! observe each other's state.

use crate::error::{MpakError, Result};
use crate::session::ArchiveSession;
use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Take, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Where a member's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberSource {
    /// A file under the override prefix
    Override(PathBuf),
    /// A byte range of the container
    Container {
        /// Container path
        path: PathBuf,
        /// Absolute payload offset
        offset: u32,
    },
}

impl MemberSource {
    /// File the bytes are read from
    pub fn path(&self) -> &Path {
        match self {
            Self::Override(path) | Self::Container { path, .. } => path,
        }
    }
}

/// Readable, self-describing view of one member
///
/// Reads stop after [`len`](Self::len) bytes even though the underlying
/// container file continues.
#[derive(Debug)]
pub struct MemberHandle {
    source: MemberSource,
    length: u64,
    reader: Take<BufReader<File>>,
}

impl MemberHandle {
    fn new(source: MemberSource, length: u64, file: File) -> Self {
        Self {
            source,
            length,
            reader: BufReader::new(file).take(length),
        }
    }

    /// Byte source of this member
    pub fn source(&self) -> &MemberSource {
        &self.source
    }

    /// Whether the bytes come from the override prefix
    pub fn is_override(&self) -> bool {
        matches!(self.source, MemberSource::Override(_))
    }

    /// Member length in bytes
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the member is empty
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> u64 {
        self.reader.limit()
    }

    /// Read the whole member into memory
    pub fn read_to_vec(mut self) -> Result<Vec<u8>> {
        let capacity = usize::try_from(self.length).unwrap_or(0);
        let mut data = Vec::with_capacity(capacity);
        self.reader.read_to_end(&mut data)?;
        if (data.len() as u64) < self.length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("member ended after {} of {} bytes", data.len(), self.length),
            )
            .into());
        }
        Ok(data)
    }

    /// Whether `path` is the file this handle reads from
    fn reads_from(&self, path: &Path) -> io::Result<bool> {
        let target = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let source = self.reader.get_ref().get_ref().metadata()?;
            Ok(source.dev() == target.dev() && source.ino() == target.ino())
        }
        #[cfg(not(unix))]
        {
            let _ = target;
            Ok(std::fs::canonicalize(self.source.path())? == std::fs::canonicalize(path)?)
        }
    }
}

impl Read for MemberHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Member name bytes as a path fragment
///
/// Names are arbitrary bytes; platforms without byte-string paths only
/// accept UTF-8 names.
#[cfg(unix)]
fn name_as_os(name: &[u8]) -> Option<&OsStr> {
    use std::os::unix::ffi::OsStrExt;
    Some(OsStr::from_bytes(name))
}

#[cfg(not(unix))]
fn name_as_os(name: &[u8]) -> Option<&OsStr> {
    std::str::from_utf8(name).ok().map(OsStr::new)
}

/// `<prefix><name>` by plain concatenation
fn override_path(prefix: &Path, name: &OsStr) -> PathBuf {
    let mut joined = OsString::from(prefix.as_os_str());
    joined.push(name);
    PathBuf::from(joined)
}

/// Output path for extracting `name` into `dest_dir`
///
/// Fails with [`MpakError::UnsafeOutputPath`] unless the name is a relative
/// path made only of normal components, so the result always stays inside
/// `dest_dir` (or the current directory).
pub fn extraction_path(dest_dir: Option<&Path>, name: &[u8]) -> Result<PathBuf> {
    let unsafe_path = || MpakError::UnsafeOutputPath(String::from_utf8_lossy(name).into_owned());

    let relative = Path::new(name_as_os(name).ok_or_else(unsafe_path)?);
    let mut has_file_name = false;
    for component in relative.components() {
        match component {
            Component::Normal(_) => has_file_name = true,
            Component::CurDir => {}
            _ => return Err(unsafe_path()),
        }
    }
    if !has_file_name {
        return Err(unsafe_path());
    }

    Ok(match dest_dir {
        Some(dir) => dir.join(relative),
        None => relative.to_path_buf(),
    })
}

/// Copy exactly `length` bytes in `chunk_size` transfers
fn copy_exact<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    length: u64,
    chunk_size: usize,
) -> io::Result<()> {
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut remaining = length;
    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(buffer.len(), |r| r.min(buffer.len()));
        reader.read_exact(&mut buffer[..n])?;
        writer.write_all(&buffer[..n])?;
        remaining -= n as u64;
    }
    writer.flush()
}

/// Open `path` for writing, reporting whether it was newly created
fn create_output(path: &Path) -> Result<(File, bool)> {
    let cannot_create = |source: io::Error| MpakError::CannotCreateOutputFile {
        path: path.to_path_buf(),
        source,
    };
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok((file, true)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            File::create(path).map(|file| (file, false)).map_err(cannot_create)
        }
        Err(e) => Err(cannot_create(e)),
    }
}

impl ArchiveSession {
    /// Resolve `name` to a readable handle
    ///
    /// An existing regular file at `<override prefix><name>` always wins.
    /// Otherwise the member is served from the container.
    pub fn open_file<N: AsRef<[u8]>>(&self, name: N) -> Result<MemberHandle> {
        let name = name.as_ref();
        let state = self.read_state()?;

        if let Some(prefix) = &state.override_dir {
            match name_as_os(name) {
                Some(os_name) => {
                    let path = override_path(prefix, os_name);
                    match File::open(&path) {
                        Ok(file) => {
                            let metadata = file.metadata()?;
                            if metadata.is_file() {
                                debug!(
                                    "'{}' served from override {}",
                                    String::from_utf8_lossy(name),
                                    path.display()
                                );
                                return Ok(MemberHandle::new(
                                    MemberSource::Override(path),
                                    metadata.len(),
                                    file,
                                ));
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => warn!(
                            "Override {} unreadable ({}), using container member",
                            path.display(),
                            e
                        ),
                    }
                }
                None => debug!(
                    "'{}' has no path form, skipping override",
                    String::from_utf8_lossy(name)
                ),
            }
        }

        let entry = state.index.entry(name).ok_or_else(|| {
            MpakError::MemberNotFound(String::from_utf8_lossy(name).into_owned())
        })?;

        let mut file = File::open(&state.path).map_err(|source| MpakError::CannotOpen {
            path: state.path.clone(),
            source,
        })?;
        file.seek(SeekFrom::Start(u64::from(entry.offset)))?;

        Ok(MemberHandle::new(
            MemberSource::Container {
                path: state.path.clone(),
                offset: entry.offset,
            },
            u64::from(entry.size),
            file,
        ))
    }

    /// Read a whole member into memory
    pub fn read_file<N: AsRef<[u8]>>(&self, name: N) -> Result<Vec<u8>> {
        self.open_file(name)?.read_to_vec()
    }

    /// Length of the member `name` resolves to, overrides included
    pub fn member_size<N: AsRef<[u8]>>(&self, name: N) -> Result<u64> {
        Ok(self.open_file(name)?.len())
    }

    /// Extract one member to `dest_dir/name`, or `name` when no directory is
    /// given, returning the number of bytes written
    ///
    /// The destination directory must exist. The file the member is read
    /// from is never overwritten. A partially written output file is removed
    /// if the copy fails and this call created it.
    pub fn extract_file<N: AsRef<[u8]>>(&self, name: N, dest_dir: Option<&Path>) -> Result<u64> {
        let name = name.as_ref();
        let out_path = extraction_path(dest_dir, name)?;
        let mut handle = self.open_file(name)?;

        if handle.reads_from(&out_path)? {
            return Err(MpakError::OutputIsSource(out_path));
        }

        let (mut out, created) = create_output(&out_path)?;

        let length = handle.len();
        if let Err(e) = copy_exact(&mut handle, &mut out, length, self.config().chunk_size) {
            drop(out);
            if created && let Err(remove_err) = std::fs::remove_file(&out_path) {
                debug!(
                    "Could not remove partial output {}: {}",
                    out_path.display(),
                    remove_err
                );
            }
            return Err(e.into());
        }

        debug!(
            "Extracted '{}' ({} bytes) to {}",
            String::from_utf8_lossy(name),
            length,
            out_path.display()
        );
        Ok(length)
    }
}
