//! Configuration for container sessions

use crate::error::{MpakError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default member capacity
pub const DEFAULT_MAX_MEMBERS: usize = 1024;

/// Default member name limit in bytes
pub const DEFAULT_MAX_NAME_LEN: usize = 63;

/// Default extraction transfer size
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Largest name the one-byte length prefix can describe
pub const FORMAT_MAX_NAME_LEN: usize = u8::MAX as usize;

/// Configuration for an [`ArchiveSession`](crate::ArchiveSession)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Maximum number of members accepted when reading or writing
    pub max_members: usize,

    /// Maximum member name length in bytes
    pub max_name_len: usize,

    /// Transfer size used by extraction
    pub chunk_size: usize,

    /// Default override prefix applied by `open_read` when none is given
    pub override_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_members: DEFAULT_MAX_MEMBERS,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            chunk_size: DEFAULT_CHUNK_SIZE,
            override_dir: None,
        }
    }
}

impl ArchiveConfig {
    /// Create a configuration with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the member capacity
    #[must_use]
    pub const fn with_max_members(mut self, max: usize) -> Self {
        self.max_members = max;
        self
    }

    /// Set the member name limit
    #[must_use]
    pub const fn with_max_name_len(mut self, max: usize) -> Self {
        self.max_name_len = max;
        self
    }

    /// Set the extraction transfer size
    #[must_use]
    pub const fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set the default override prefix
    #[must_use]
    pub fn with_override_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.override_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(MpakError::InvalidConfig(
                "chunk_size must be non-zero".to_string(),
            ));
        }
        if self.max_name_len == 0 || self.max_name_len > FORMAT_MAX_NAME_LEN {
            return Err(MpakError::InvalidConfig(format!(
                "max_name_len must be 1-{FORMAT_MAX_NAME_LEN}, got {}",
                self.max_name_len
            )));
        }
        if u32::try_from(self.max_members).is_err() {
            return Err(MpakError::InvalidConfig(format!(
                "max_members {} does not fit the 32-bit member count",
                self.max_members
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert_eq!(config.max_members, 1024);
        assert_eq!(config.max_name_len, 63);
        assert_eq!(config.chunk_size, 16384);
        assert!(config.override_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = ArchiveConfig::new()
            .with_max_members(8)
            .with_max_name_len(255)
            .with_chunk_size(512)
            .with_override_dir("mods/");
        assert_eq!(config.max_members, 8);
        assert_eq!(config.max_name_len, 255);
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.override_dir, Some(PathBuf::from("mods/")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(ArchiveConfig::new().with_chunk_size(0).validate().is_err());
        assert!(ArchiveConfig::new().with_max_name_len(0).validate().is_err());
        assert!(
            ArchiveConfig::new()
                .with_max_name_len(256)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ArchiveConfig = serde_json::from_str(r#"{"max_members": 4}"#).unwrap();
        assert_eq!(config.max_members, 4);
        assert_eq!(config.max_name_len, DEFAULT_MAX_NAME_LEN);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
