//! Command-line arguments and configuration loading.
//!
//! Limits come from three layers, later ones winning:
//! - `ArchiveConfig` defaults
//! - a JSON file given with `--config` (or `MPAK_CONFIG`)
//! - `--max-members`, `--max-name-len`, `--chunk-size` and their `MPAK_*`
//!   environment variables

use crate::error::CliError;
use clap::{Args, Parser, Subcommand};
use mpak_format::ArchiveConfig;
use std::path::PathBuf;

/// Pack, inspect and extract MPK1 asset containers
#[derive(Debug, Parser)]
#[command(name = "mpak", version, about, propagate_version = true)]
pub struct Cli {
    /// Library limits
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Global options that populate [`ArchiveConfig`]
#[derive(Debug, Default, Args)]
pub struct ConfigArgs {
    /// JSON file holding an `ArchiveConfig`
    #[arg(long, global = true, env = "MPAK_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum number of members per container
    #[arg(long, global = true, env = "MPAK_MAX_MEMBERS")]
    pub max_members: Option<usize>,

    /// Maximum member name length in bytes
    #[arg(long, global = true, env = "MPAK_MAX_NAME_LEN")]
    pub max_name_len: Option<usize>,

    /// Extraction transfer size in bytes
    #[arg(long, global = true, env = "MPAK_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,
}

impl ConfigArgs {
    /// Build the session configuration
    pub fn load(&self) -> Result<ArchiveConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| {
                    CliError::ConfigRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                serde_json::from_str(&text).map_err(|source| CliError::ConfigParse {
                    path: path.clone(),
                    source,
                })?
            }
            None => ArchiveConfig::default(),
        };

        if let Some(max) = self.max_members {
            config = config.with_max_members(max);
        }
        if let Some(max) = self.max_name_len {
            config = config.with_max_name_len(max);
        }
        if let Some(size) = self.chunk_size {
            config = config.with_chunk_size(size);
        }
        Ok(config)
    }
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a container from files and directories
    Pack {
        /// Container to create (overwritten if present)
        archive: PathBuf,

        /// Files or directories to add, directories recursively
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Name members by their path relative to this directory
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Print the offset, size and name of every member
    List {
        /// Container to read
        archive: PathBuf,
    },

    /// Validate magic, checksum and file table
    Verify {
        /// Container to check
        archive: PathBuf,
    },

    /// Extract members, or all of them when none are named
    Extract {
        /// Container to read
        archive: PathBuf,

        /// Members to extract
        names: Vec<String>,

        /// Destination directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Prefix whose files shadow container members
        #[arg(long = "override", value_name = "PREFIX")]
        override_dir: Option<PathBuf>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_parse_extract() {
        let cli = Cli::try_parse_from([
            "mpak",
            "extract",
            "game.mpk",
            "a.png",
            "b.ogg",
            "--override",
            "mods/",
            "-o",
            "out",
        ])
        .unwrap();

        match cli.command {
            Command::Extract {
                archive,
                names,
                output,
                override_dir,
            } => {
                assert_eq!(archive, PathBuf::from("game.mpk"));
                assert_eq!(names, vec!["a.png".to_string(), "b.ogg".to_string()]);
                assert_eq!(output, PathBuf::from("out"));
                assert_eq!(override_dir, Some(PathBuf::from("mods/")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_extract_defaults() {
        let cli = Cli::try_parse_from(["mpak", "extract", "game.mpk"]).unwrap();
        let Command::Extract {
            names,
            output,
            override_dir,
            ..
        } = cli.command
        else {
            panic!("expected extract");
        };
        assert!(names.is_empty());
        assert_eq!(output, PathBuf::from("output"));
        assert!(override_dir.is_none());
    }

    #[test]
    fn test_pack_requires_inputs() {
        assert!(Cli::try_parse_from(["mpak", "pack", "game.mpk"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["mpak", "list", "game.mpk", "--max-members", "8"]).unwrap();
        assert_eq!(cli.config.max_members, Some(8));
        let config = cli.config.load().unwrap();
        assert_eq!(config.max_members, 8);
        assert_eq!(config.max_name_len, ArchiveConfig::default().max_name_len);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mpak.json");
        std::fs::write(&path, r#"{ "max_members": 10, "chunk_size": 512 }"#).unwrap();

        let args = ConfigArgs {
            config: Some(path),
            chunk_size: Some(4096),
            ..ConfigArgs::default()
        };
        let config = args.load().unwrap();
        assert_eq!(config.max_members, 10);
        assert_eq!(config.chunk_size, 4096);
    }

    #[test]
    fn test_bad_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();

        let args = ConfigArgs {
            config: Some(path),
            ..ConfigArgs::default()
        };
        assert!(matches!(args.load(), Err(CliError::ConfigParse { .. })));

        let args = ConfigArgs {
            config: Some(dir.path().join("missing.json")),
            ..ConfigArgs::default()
        };
        assert!(matches!(args.load(), Err(CliError::ConfigRead { .. })));
    }
}
