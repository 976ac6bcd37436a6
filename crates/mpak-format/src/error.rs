//! Error types for MPK1 container operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, MpakError>;

/// Errors that can occur while reading, writing or extracting containers
#[derive(Debug, Error)]
pub enum MpakError {
    /// The session already has a container open
    #[error("Session already has an open container")]
    AlreadyOpen,

    /// Operation requires a container opened for reading
    #[error("No container is open for reading")]
    NotOpenForRead,

    /// Operation requires a container opened for writing
    #[error("No container is open for writing")]
    NotOpenForWrite,

    /// The container file could not be opened or created
    #[error("Cannot open container {path}: {source}")]
    CannotOpen {
        /// Path of the container
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The first four bytes are not the MPK1 magic
    #[error("Invalid magic: expected 'MPK1', got {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// Stored checksum does not match the recomputed digest
    #[error("Checksum mismatch: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum computed over the file contents
        actual: u32,
    },

    /// The file ends inside the fixed header
    #[error("Truncated header: expected {expected} bytes, got {actual} bytes")]
    TruncatedHeader {
        /// Header size
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// The file table is structurally invalid
    #[error("Invalid file table: {reason}")]
    InvalidIndex {
        /// Description of the violated constraint
        reason: String,
    },

    /// No member with this name exists in the container or override directory
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// The extraction target could not be created
    #[error("Cannot create output file {path}: {source}")]
    CannotCreateOutputFile {
        /// Path of the output file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Extraction target is the file the member is read from
    #[error("Refusing to extract over the source file {0}")]
    OutputIsSource(PathBuf),

    /// Member name would be written outside the extraction directory
    #[error("Member name '{0}' is not a safe relative output path")]
    UnsafeOutputPath(String),

    /// Member names must contain at least one byte
    #[error("Member name is empty")]
    EmptyName,

    /// Member name exceeds the configured limit
    #[error("Member name '{name}' is {len} bytes, limit is {max}")]
    NameTooLong {
        /// Offending name
        name: String,
        /// Its length in bytes
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// A member with this name was already written
    #[error("Duplicate member name: {0}")]
    DuplicateMember(String),

    /// Member count exceeds the configured capacity
    #[error("Too many members: {count} exceeds limit of {max}")]
    TooManyMembers {
        /// Declared or attempted member count
        count: u64,
        /// Configured limit
        max: usize,
    },

    /// Container would grow past the 32-bit offset space
    #[error("Container exceeds the 4 GiB offset limit at {0} bytes")]
    ArchiveTooLarge(u64),

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Binary read/write error
    #[error("Binary format error: {0}")]
    BinRead(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<binrw::Error> for MpakError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::Io(io) => Self::Io(io),
            binrw::Error::Custom { err, .. } => match err.downcast::<Self>() {
                Ok(inner) => *inner,
                Err(other) => Self::BinRead(format!("{other:?}")),
            },
            other => Self::BinRead(other.to_string()),
        }
    }
}

impl MpakError {
    /// Check if this error means the container contents are damaged
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic(_)
                | Self::TruncatedHeader { .. }
                | Self::ChecksumMismatch { .. }
                | Self::InvalidIndex { .. }
        )
    }

    /// Check if this error is permanent for the given container and inputs
    ///
    /// Only bare I/O failures may depend on transient filesystem state.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MpakError::InvalidMagic(*b"MPK\0");
        assert!(err.to_string().contains("'MPK1'"));

        let err = MpakError::ChecksumMismatch {
            expected: 0xDEAD_BEEF,
            actual: 0x1234_5678,
        };
        let msg = err.to_string();
        assert!(msg.contains("0xdeadbeef"));
        assert!(msg.contains("0x12345678"));

        let err = MpakError::NameTooLong {
            name: "x".repeat(70),
            len: 70,
            max: 63,
        };
        assert!(err.to_string().contains("63"));

        let err = MpakError::MemberNotFound("gfx/title.png".to_string());
        assert!(err.to_string().contains("gfx/title.png"));
    }

    #[test]
    fn test_error_classification() {
        assert!(MpakError::InvalidMagic([0; 4]).is_corruption());
        assert!(
            MpakError::ChecksumMismatch {
                expected: 1,
                actual: 2
            }
            .is_corruption()
        );
        assert!(
            MpakError::InvalidIndex {
                reason: "bad".to_string()
            }
            .is_corruption()
        );
        assert!(!MpakError::MemberNotFound("a".to_string()).is_corruption());
        assert!(!MpakError::OutputIsSource(PathBuf::from("a")).is_corruption());
        assert!(MpakError::OutputIsSource(PathBuf::from("a")).is_permanent());

        assert!(MpakError::MemberNotFound("a".to_string()).is_permanent());
        assert!(MpakError::AlreadyOpen.is_permanent());
        assert!(!MpakError::Io(std::io::Error::other("disk")).is_permanent());
    }

    #[test]
    fn test_binrw_custom_error_unwraps() {
        let wrapped = binrw::Error::Custom {
            pos: 0,
            err: Box::new(MpakError::EmptyName),
        };
        assert!(matches!(MpakError::from(wrapped), MpakError::EmptyName));

        let io = binrw::Error::Io(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(matches!(MpakError::from(io), MpakError::Io(_)));
    }
}
