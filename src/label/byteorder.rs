//! Byte order of on-disk label fields.

use crate::config::{UBERBLOCK_MAGIC, ZEC_MAGIC};
use serde::Serialize;

/// Checksum trailer magic as it reads on a host of the opposite order.
pub const ZEC_MAGIC_SWAPPED: u64 = ZEC_MAGIC.swap_bytes();

/// Uberblock magic as it reads on a host of the opposite order.
pub const UBERBLOCK_MAGIC_SWAPPED: u64 = UBERBLOCK_MAGIC.swap_bytes();

/// Order in which a writer laid out multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Order of the running host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// True when fields in this order need swapping on this host.
    pub fn is_swapped(self) -> bool {
        self != Self::native()
    }

    /// Infer the order from a raw 8-byte magic field.
    ///
    /// Returns `None` when the bytes match `magic` in neither order.
    pub fn detect(raw: [u8; 8], magic: u64) -> Option<Self> {
        if u64::from_le_bytes(raw) == magic {
            Some(ByteOrder::Little)
        } else if u64::from_be_bytes(raw) == magic {
            Some(ByteOrder::Big)
        } else {
            None
        }
    }

    /// Read a `u64` at `offset`.
    ///
    /// Panics if `buf` is too short; callers slice against fixed layouts.
    pub fn read_u64(self, buf: &[u8], offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[offset..offset + 8]);
        match self {
            ByteOrder::Little => u64::from_le_bytes(raw),
            ByteOrder::Big => u64::from_be_bytes(raw),
        }
    }

    /// Write a `u64` at `offset`.
    pub fn write_u64(self, buf: &mut [u8], offset: usize, value: u64) {
        let raw = match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        buf[offset..offset + 8].copy_from_slice(&raw);
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little-endian"),
            ByteOrder::Big => write!(f, "big-endian"),
        }
    }
}

/// Read the raw 8 bytes at `offset`.
pub(crate) fn raw_u64(buf: &[u8], offset: usize) -> [u8; 8] {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    raw
}
