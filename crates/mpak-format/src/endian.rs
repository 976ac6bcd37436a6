//! Byte order normalization for on-disk integer fields
//!
//! Every multi-byte field of an MPK1 container (checksum, file table offset,
//! member count, member offsets) is stored little-endian. Values are read as
//! raw host-order words and then passed through [`from_disk`], which swaps
//! them on big-endian hosts and leaves them untouched otherwise. Name bytes
//! and the one-byte name length prefix are never normalized.

use std::io::{self, Read, Write};
use std::sync::LazyLock;

/// Byte order of a machine or a file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

/// Byte order used by the container format
pub const DISK_ORDER: ByteOrder = ByteOrder::Little;

static HOST_ORDER: LazyLock<ByteOrder> = LazyLock::new(|| {
    if 1u16.to_ne_bytes()[0] == 1 {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    }
});

impl ByteOrder {
    /// Byte order of the running process, detected once
    pub fn host() -> Self {
        *HOST_ORDER
    }

    /// Whether values must be swapped between this order and the disk order
    pub fn needs_swap(self) -> bool {
        self != DISK_ORDER
    }
}

/// Reverse the byte order of a 32-bit word
#[inline]
pub const fn swap_u32(value: u32) -> u32 {
    (value << 24) | ((value << 8) & 0x00FF_0000) | ((value >> 8) & 0x0000_FF00) | (value >> 24)
}

/// Normalize a host-order value into its on-disk representation
#[inline]
pub fn to_disk(value: u32) -> u32 {
    if ByteOrder::host().needs_swap() {
        swap_u32(value)
    } else {
        value
    }
}

/// Normalize a raw on-disk word into host order
///
/// The conversion is its own inverse, so this is the same operation as
/// [`to_disk`]; the two names keep call sites readable.
#[inline]
pub fn from_disk(value: u32) -> u32 {
    to_disk(value)
}

/// Read one normalized 32-bit field
pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(from_disk(u32::from_ne_bytes(buf)))
}

/// Write one normalized 32-bit field
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&to_disk(value).to_ne_bytes())
}
