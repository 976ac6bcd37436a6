//! Reader and writer for MPK1 game asset containers
//!
//! An MPK1 container packs many small named payloads into one file with a
//! trailing file table and a CRC-32 over everything after the first eight
//! bytes. During development an override prefix can shadow members with
//! loose files on disk.
//!
//! # Layout
//!
//! ```text
//! [0x00] "MPK1"
//! [0x04] CRC-32 of [0x08, EOF)          (u32 LE)
//! [0x08] file table offset              (u32 LE)
//! [0x0C] payloads, contiguous, in table order
//! [file table offset]
//!        member count N                 (u32 LE)
//!        N x { name length (u8), name, payload offset (u32 LE) }
//! ```
//!
//! Member sizes are derived from consecutive offsets, the last member ending
//! at the file table.
//!
//! # Example
//!
//! ```rust,no_run
//! use mpak_format::ArchiveSession;
//! use std::path::Path;
//!
//! # fn main() -> mpak_format::Result<()> {
//! let mut session = ArchiveSession::new();
//! session.open_read("res/game.mpk", Some("override/"))?;
//!
//! let handle = session.open_file("title.png")?;
//! println!("{} bytes from {:?}", handle.len(), handle.source());
//!
//! session.extract_file("title.png", Some(Path::new("out")))?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod checksum;
pub mod config;
pub mod endian;
pub mod error;
pub mod header;
pub mod index;
pub mod overlay;
pub mod session;

pub use config::ArchiveConfig;
pub use error::{MpakError, Result};
pub use header::{ArchiveHeader, MAGIC};
pub use index::{ArchiveIndex, IndexEntry};
pub use overlay::{MemberHandle, MemberSource, extraction_path};
pub use session::{ArchiveSession, SessionMode};
