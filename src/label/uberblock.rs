//! Uberblock decoding: the bootstrap record at the head of each ring slot.

use crate::config::UBERBLOCK_MAGIC;
use crate::label::byteorder::{raw_u64, ByteOrder};
use serde::Serialize;

pub const UB_MAGIC_OFFSET: usize = 0;
pub const UB_VERSION_OFFSET: usize = 8;
pub const UB_TXG_OFFSET: usize = 16;
pub const UB_GUID_SUM_OFFSET: usize = 24;
pub const UB_TIMESTAMP_OFFSET: usize = 32;
pub const UB_ROOTBP_OFFSET: usize = 40;

/// Logical birth txg within a block pointer.
pub const BP_BIRTH_OFFSET: usize = 80;

/// Size of a block pointer.
pub const BP_SIZE: usize = 128;

/// Bytes of an uberblock slot that carry decoded fields.
pub const UB_HEADER_SIZE: usize = UB_ROOTBP_OFFSET + BP_SIZE;

/// Decoded uberblock fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Uberblock {
    /// Magic number; `UBERBLOCK_MAGIC` once written.
    pub magic: u64,
    /// On-disk format version.
    pub version: u64,
    /// Transaction group this uberblock commits.
    pub txg: u64,
    /// Sum of all leaf vdev guids.
    pub guid_sum: u64,
    /// Seconds since the epoch at commit.
    pub timestamp: u64,
    /// Logical birth txg of the root block pointer.
    pub root_birth: u64,
}

impl Uberblock {
    /// Decode an uberblock slot in the given byte order.
    ///
    /// Returns `None` if `slot` is shorter than the fixed header.
    pub fn decode(slot: &[u8], order: ByteOrder) -> Option<Self> {
        if slot.len() < UB_HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: order.read_u64(slot, UB_MAGIC_OFFSET),
            version: order.read_u64(slot, UB_VERSION_OFFSET),
            txg: order.read_u64(slot, UB_TXG_OFFSET),
            guid_sum: order.read_u64(slot, UB_GUID_SUM_OFFSET),
            timestamp: order.read_u64(slot, UB_TIMESTAMP_OFFSET),
            root_birth: order.read_u64(slot, UB_ROOTBP_OFFSET + BP_BIRTH_OFFSET),
        })
    }

    /// Check the magic number.
    pub fn is_valid(&self) -> bool {
        self.magic == UBERBLOCK_MAGIC
    }

    /// Whether the slot was ever written.
    pub fn is_empty(&self) -> bool {
        self.magic == 0 && self.txg == 0
    }
}

/// True when the txg field is zero, independent of byte order.
pub fn txg_is_zero(slot: &[u8]) -> bool {
    raw_u64(slot, UB_TXG_OFFSET) == [0u8; 8]
}

/// Infer the writer's byte order from the uberblock magic.
pub fn detect_order(slot: &[u8]) -> Option<ByteOrder> {
    ByteOrder::detect(raw_u64(slot, UB_MAGIC_OFFSET), UBERBLOCK_MAGIC)
}

/// Logical birth txg of the root block pointer.
pub fn root_birth(slot: &[u8], order: ByteOrder) -> u64 {
    order.read_u64(slot, UB_ROOTBP_OFFSET + BP_BIRTH_OFFSET)
}

/// Store a new txg into an uberblock slot.
pub fn set_txg(slot: &mut [u8], order: ByteOrder, txg: u64) {
    order.write_u64(slot, UB_TXG_OFFSET, txg);
}
