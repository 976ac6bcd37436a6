//! Error types for the `mpak` tool.

use mpak_format::MpakError;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Exit status when a container cannot be opened or fails validation
pub const EXIT_OPEN_FAILED: u8 = 2;

/// Errors reported by the command implementations.
#[derive(Debug, Error)]
pub enum CliError {
    /// Container could not be opened or failed validation
    #[error("Cannot open container {path}: {source}")]
    OpenFailed {
        /// Container path
        path: PathBuf,
        /// Library error
        #[source]
        source: MpakError,
    },

    /// Configuration file could not be read
    #[error("Cannot read configuration {path}: {source}")]
    ConfigRead {
        /// Configuration path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for `ArchiveConfig`
    #[error("Invalid configuration {path}: {source}")]
    ConfigParse {
        /// Configuration path
        path: PathBuf,
        /// JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Input path yields no usable member name
    #[error("Cannot derive a member name from {0}")]
    NoMemberName(PathBuf),

    /// Some members could not be extracted
    #[error("{failed} of {total} members failed to extract")]
    ExtractionIncomplete {
        /// Failed member count
        failed: usize,
        /// Requested member count
        total: usize,
    },
}

impl CliError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::OpenFailed { .. } => ExitCode::from(EXIT_OPEN_FAILED),
            _ => ExitCode::FAILURE,
        }
    }
}

/// Exit status for any error surfaced from `run`
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.downcast_ref::<CliError>()
        .map_or(ExitCode::FAILURE, CliError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failure_exit_code() {
        let err = CliError::OpenFailed {
            path: PathBuf::from("game.mpk"),
            source: MpakError::InvalidMagic(*b"ZIP!"),
        };
        assert_eq!(err.exit_code(), ExitCode::from(EXIT_OPEN_FAILED));

        let wrapped = anyhow::Error::new(err).context("verify");
        assert_eq!(exit_code_for(&wrapped), ExitCode::from(EXIT_OPEN_FAILED));
    }

    #[test]
    fn test_other_failures_exit_one() {
        let err = CliError::ExtractionIncomplete {
            failed: 1,
            total: 3,
        };
        assert_eq!(err.exit_code(), ExitCode::FAILURE);
        assert_eq!(
            exit_code_for(&anyhow::anyhow!("unrelated")),
            ExitCode::FAILURE
        );
    }
}
