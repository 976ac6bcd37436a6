//! Subcommand implementations.

use crate::cli::Command;
use crate::error::CliError;
use anyhow::{Context, Result};
use mpak_format::{ArchiveConfig, ArchiveSession};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Run one subcommand, writing its report to `out`
pub fn run<W: Write>(command: Command, config: ArchiveConfig, out: &mut W) -> Result<()> {
    match command {
        Command::Pack {
            archive,
            inputs,
            root,
        } => pack(&archive, &inputs, root.as_deref(), config, out),
        Command::List { archive } => list(&archive, config, out),
        Command::Verify { archive } => verify(&archive, config, out),
        Command::Extract {
            archive,
            names,
            output,
            override_dir,
        } => extract(
            &archive,
            &names,
            &output,
            override_dir.as_deref(),
            config,
            out,
        ),
    }
}

fn open_archive(
    path: &Path,
    override_dir: Option<&Path>,
    config: ArchiveConfig,
) -> Result<ArchiveSession> {
    let mut session = ArchiveSession::with_config(config).context("invalid configuration")?;
    session
        .open_read(path, override_dir)
        .map_err(|source| CliError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(session)
}

/// Member name for `path`: relative to `base`, components joined with '/'
fn member_name(path: &Path, base: &Path) -> Result<String, CliError> {
    let relative = path
        .strip_prefix(base)
        .map_err(|_| CliError::NoMemberName(path.to_path_buf()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| CliError::NoMemberName(path.to_path_buf()))?,
            ),
            Component::CurDir => {}
            _ => return Err(CliError::NoMemberName(path.to_path_buf())),
        }
    }
    if parts.is_empty() {
        return Err(CliError::NoMemberName(path.to_path_buf()));
    }
    Ok(parts.join("/"))
}

/// Files to pack with their member names, in a stable order
fn collect_inputs(inputs: &[PathBuf], root: Option<&Path>) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let base = root.unwrap_or(input);
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = entry.with_context(|| format!("walking {}", input.display()))?;
                if entry.file_type().is_file() {
                    let name = member_name(entry.path(), base)?;
                    files.push((name, entry.into_path()));
                }
            }
        } else {
            let base = match root {
                Some(root) => root,
                None => input.parent().unwrap_or_else(|| Path::new("")),
            };
            files.push((member_name(input, base)?, input.clone()));
        }
    }
    Ok(files)
}

fn pack<W: Write>(
    archive: &Path,
    inputs: &[PathBuf],
    root: Option<&Path>,
    config: ArchiveConfig,
    out: &mut W,
) -> Result<()> {
    let files = collect_inputs(inputs, root)?;

    let mut session = ArchiveSession::with_config(config).context("invalid configuration")?;
    session
        .open_write(archive)
        .with_context(|| format!("creating {}", archive.display()))?;

    for (name, path) in &files {
        let entry = session
            .add_file(name, path)
            .with_context(|| format!("adding {} as '{}'", path.display(), name))?;
        debug!(
            "Packed '{}' at {} ({} bytes)",
            entry.display_name(),
            entry.offset,
            entry.size
        );
    }
    session
        .close()
        .with_context(|| format!("finalizing {}", archive.display()))?;

    info!("Packed {} members into {}", files.len(), archive.display());
    writeln!(out, "{}: {} members", archive.display(), files.len())?;
    Ok(())
}

fn list<W: Write>(archive: &Path, config: ArchiveConfig, out: &mut W) -> Result<()> {
    let session = open_archive(archive, None, config)?;
    let Some(index) = session.index() else {
        return Ok(());
    };

    writeln!(out, "{:>10} {:>10}  NAME", "OFFSET", "SIZE")?;
    for entry in index {
        writeln!(
            out,
            "{:>10} {:>10}  {}",
            entry.offset,
            entry.size,
            entry.display_name()
        )?;
    }
    Ok(())
}

fn verify<W: Write>(archive: &Path, config: ArchiveConfig, out: &mut W) -> Result<()> {
    let session = open_archive(archive, None, config)?;
    let members = session.member_count();
    let payload = session.index().map_or(0, mpak_format::ArchiveIndex::total_payload_size);
    let checksum = session.checksum().unwrap_or_default();

    writeln!(
        out,
        "{}: OK, {} members, {} payload bytes, checksum {:#010x}",
        archive.display(),
        members,
        payload,
        checksum
    )?;
    Ok(())
}

fn extract<W: Write>(
    archive: &Path,
    names: &[String],
    output: &Path,
    override_dir: Option<&Path>,
    config: ArchiveConfig,
    out: &mut W,
) -> Result<()> {
    let session = open_archive(archive, override_dir, config)?;

    let names: Vec<Vec<u8>> = if names.is_empty() {
        session
            .index()
            .map(|index| index.names().map(<[u8]>::to_vec).collect())
            .unwrap_or_default()
    } else {
        names.iter().map(|name| name.as_bytes().to_vec()).collect()
    };

    std::fs::create_dir_all(output)
        .with_context(|| format!("creating {}", output.display()))?;

    let mut failed = 0;
    for name in &names {
        let shown = String::from_utf8_lossy(name);
        let path = match mpak_format::extraction_path(Some(output), name) {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to extract '{}': {}", shown, e);
                failed += 1;
                continue;
            }
        };
        if let Some(parent) = path.parent()
            && parent != output
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory for '{shown}'"))?;
        }

        match session.extract_file(name, Some(output)) {
            Ok(bytes) => writeln!(out, "{shown}: {bytes} bytes")?,
            Err(e) => {
                warn!("Failed to extract '{}': {}", shown, e);
                failed += 1;
            }
        }
    }

    info!(
        "Extracted {} of {} members to {}",
        names.len() - failed,
        names.len(),
        output.display()
    );
    if failed > 0 {
        return Err(CliError::ExtractionIncomplete {
            failed,
            total: names.len(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::{EXIT_OPEN_FAILED, exit_code_for};
    use pretty_assertions::assert_eq;
    use std::process::ExitCode;
    use tempfile::tempdir;

    fn write_tree(root: &Path) {
        std::fs::create_dir_all(root.join("gfx")).unwrap();
        std::fs::write(root.join("gfx/title.png"), b"png bytes").unwrap();
        std::fs::write(root.join("gfx/tiles.png"), vec![3u8; 20_000]).unwrap();
        std::fs::write(root.join("readme.txt"), b"").unwrap();
    }

    fn run_to_string(command: Command) -> Result<String> {
        let mut out = Vec::new();
        run(command, ArchiveConfig::default(), &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_member_name() {
        assert_eq!(
            member_name(Path::new("assets/gfx/a.png"), Path::new("assets")).unwrap(),
            "gfx/a.png"
        );
        assert_eq!(member_name(Path::new("a.png"), Path::new("")).unwrap(), "a.png");
        assert!(member_name(Path::new("assets"), Path::new("assets")).is_err());
        assert!(member_name(Path::new("other/a.png"), Path::new("assets")).is_err());
    }

    #[test]
    fn test_pack_list_extract() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("assets");
        write_tree(&assets);
        let archive = dir.path().join("game.mpk");

        let report = run_to_string(Command::Pack {
            archive: archive.clone(),
            inputs: vec![assets.clone()],
            root: None,
        })
        .unwrap();
        assert!(report.contains("3 members"));

        let listing = run_to_string(Command::List {
            archive: archive.clone(),
        })
        .unwrap();
        let names: Vec<&str> = listing
            .lines()
            .skip(1)
            .filter_map(|line| line.split_whitespace().nth(2))
            .collect();
        assert_eq!(names, vec!["gfx/tiles.png", "gfx/title.png", "readme.txt"]);

        let verified = run_to_string(Command::Verify {
            archive: archive.clone(),
        })
        .unwrap();
        assert!(verified.contains("OK, 3 members, 20009 payload bytes"));

        let output = dir.path().join("out");
        run_to_string(Command::Extract {
            archive,
            names: Vec::new(),
            output: output.clone(),
            override_dir: None,
        })
        .unwrap();
        assert_eq!(
            std::fs::read(output.join("gfx/title.png")).unwrap(),
            b"png bytes"
        );
        assert_eq!(
            std::fs::read(output.join("gfx/tiles.png")).unwrap(),
            vec![3u8; 20_000]
        );
        assert!(std::fs::read(output.join("readme.txt")).unwrap().is_empty());
    }

    #[test]
    fn test_pack_with_root_and_single_files() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("assets");
        write_tree(&assets);

        let files = collect_inputs(
            &[assets.join("gfx/title.png"), assets.join("readme.txt")],
            None,
        )
        .unwrap();
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["title.png", "readme.txt"]);

        let files = collect_inputs(&[assets.join("gfx")], Some(&assets)).unwrap();
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["gfx/tiles.png", "gfx/title.png"]);
    }

    #[test]
    fn test_extract_with_override_and_missing_member() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("assets");
        write_tree(&assets);
        let archive = dir.path().join("game.mpk");
        run_to_string(Command::Pack {
            archive: archive.clone(),
            inputs: vec![assets],
            root: None,
        })
        .unwrap();

        let mods = dir.path().join("mods");
        std::fs::create_dir_all(mods.join("gfx")).unwrap();
        std::fs::write(mods.join("gfx/title.png"), b"modded").unwrap();

        let output = dir.path().join("out");
        let err = run_to_string(Command::Extract {
            archive,
            names: vec!["gfx/title.png".to_string(), "nope.bin".to_string()],
            output: output.clone(),
            override_dir: Some(PathBuf::from(format!("{}/", mods.display()))),
        })
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::ExtractionIncomplete {
                failed: 1,
                total: 2
            })
        ));
        assert_eq!(exit_code_for(&err), ExitCode::FAILURE);
        assert_eq!(std::fs::read(output.join("gfx/title.png")).unwrap(), b"modded");
    }

    #[test]
    fn test_extract_creates_nothing_outside_output() {
        let dir = tempdir().unwrap();
        let payload = dir.path().join("x");
        std::fs::write(&payload, b"escape").unwrap();

        let archive = dir.path().join("evil.mpk");
        let mut session = ArchiveSession::new();
        session.open_write(&archive).unwrap();
        session.add_file("../escaped_dir/x", &payload).unwrap();
        session.add_file("safe/ok.txt", &payload).unwrap();
        session.close().unwrap();

        let output = dir.path().join("out");
        let err = run_to_string(Command::Extract {
            archive,
            names: Vec::new(),
            output: output.clone(),
            override_dir: None,
        })
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::ExtractionIncomplete {
                failed: 1,
                total: 2
            })
        ));
        assert!(!dir.path().join("escaped_dir").exists());
        assert_eq!(std::fs::read(output.join("safe/ok.txt")).unwrap(), b"escape");
    }

    #[test]
    fn test_corrupt_container_exits_with_open_status() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("bad.mpk");
        std::fs::write(&archive, b"PK\x03\x04 not a container").unwrap();

        let err = run_to_string(Command::Verify { archive }).unwrap_err();
        assert_eq!(exit_code_for(&err), ExitCode::from(EXIT_OPEN_FAILED));

        let err = run_to_string(Command::List {
            archive: dir.path().join("missing.mpk"),
        })
        .unwrap_err();
        assert_eq!(exit_code_for(&err), ExitCode::from(EXIT_OPEN_FAILED));
    }
}
