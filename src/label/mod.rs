//! Vdev label decoding.
//!
//! A label is a fixed 256 KiB region:
//!
//! ```text
//! 0        pad (8 KiB)
//! 8 KiB    boot envelope (8 KiB)
//! 16 KiB   config nvlist window + checksum trailer (112 KiB)
//! 128 KiB  uberblock ring (128 KiB)
//! ```
//!
//! Decoding only inspects; all mutation happens in the repair orchestrator.

pub mod byteorder;
pub mod nvlist;
pub mod trailer;
pub mod uberblock;

use crate::config::{
    keys, uberblock_size, ECK_SIZE, LABEL_SIZE, VDEV_PHYS_OFFSET, VDEV_PHYS_SIZE,
    VDEV_UBERBLOCK_OFFSET, VDEV_UBERBLOCK_RING,
};
use crate::error::{NvListError, SlotError};
use crate::label::byteorder::ByteOrder;
use crate::label::nvlist::NvList;
use crate::label::uberblock::Uberblock;
use std::ops::Range;

/// Byte range of the config region (window + trailer) within a label.
pub fn config_region() -> Range<usize> {
    VDEV_PHYS_OFFSET..VDEV_PHYS_OFFSET + VDEV_PHYS_SIZE
}

/// Byte range of the nvlist window within a label.
pub fn config_window() -> Range<usize> {
    VDEV_PHYS_OFFSET..VDEV_PHYS_OFFSET + VDEV_PHYS_SIZE - ECK_SIZE
}

/// Byte range of ring entry `index` for a given uberblock size.
pub fn uberblock_region(ub_size: usize, index: usize) -> Range<usize> {
    let start = VDEV_UBERBLOCK_OFFSET + index * ub_size;
    start..start + ub_size
}

/// A label whose structure has been checked and is eligible for repair.
#[derive(Debug, Clone)]
pub struct DecodedLabel {
    /// Unpacked config nvlist.
    pub config: NvList,
    /// Block alignment exponent from `vdev_tree`.
    pub ashift: u64,
    /// Uberblock slot size derived from `ashift`.
    pub ub_size: usize,
    /// Every ring entry, decoded in its own byte order.
    pub ring: Vec<Uberblock>,
}

impl DecodedLabel {
    /// Written ring entries other than the repair target.
    pub fn written_entries(&self) -> impl Iterator<Item = &Uberblock> {
        self.ring.iter().skip(1).filter(|ub| ub.is_valid())
    }

    /// Highest txg among written ring entries.
    pub fn newest_txg(&self) -> Option<u64> {
        self.written_entries().map(|ub| ub.txg).max()
    }
}

/// Decode one raw label and check that it is safe to repair.
///
/// Checks, in order: the target uberblock (ring entry 0) has a zero txg,
/// the config window unpacks, and the required keys are present.
pub fn decode_label(raw: &[u8]) -> Result<DecodedLabel, SlotError> {
    debug_assert_eq!(raw.len() as u64, LABEL_SIZE);

    let target = &raw[uberblock_region(uberblock_size(0), 0)];
    if !uberblock::txg_is_zero(target) {
        let order = uberblock::detect_order(target).unwrap_or(ByteOrder::native());
        return Err(SlotError::AlreadyFinalized {
            txg: order.read_u64(target, uberblock::UB_TXG_OFFSET),
        });
    }

    let config = NvList::unpack(&raw[config_window()]).map_err(SlotError::ConfigUnparseable)?;
    let ashift = check_required_keys(&config)?;
    let ub_size = uberblock_size(ashift);

    let ring = (0..VDEV_UBERBLOCK_RING / ub_size)
        .filter_map(|i| {
            let entry = &raw[uberblock_region(ub_size, i)];
            let order = uberblock::detect_order(entry).unwrap_or(ByteOrder::native());
            Uberblock::decode(entry, order)
        })
        .collect();

    Ok(DecodedLabel {
        config,
        ashift,
        ub_size,
        ring,
    })
}

/// Verify required config keys, returning the ashift.
fn check_required_keys(config: &NvList) -> Result<u64, SlotError> {
    for key in [keys::VERSION, keys::POOL_STATE, keys::POOL_GUID] {
        if config.lookup_u64(key).is_none() {
            return Err(missing(key));
        }
    }

    let tree = config
        .lookup_nvlist(keys::VDEV_TREE)
        .ok_or_else(|| missing(keys::VDEV_TREE))?;
    let ashift = tree
        .lookup_u64(keys::ASHIFT)
        .ok_or_else(|| missing(keys::ASHIFT))?;
    if ashift == 0 {
        return Err(SlotError::ConfigIncomplete {
            key: keys::ASHIFT,
            reason: "is zero",
        });
    }
    Ok(ashift)
}

fn missing(key: &'static str) -> SlotError {
    SlotError::ConfigIncomplete {
        key,
        reason: "not found",
    }
}

/// Repack `config` into the label's nvlist window.
pub fn repack_config(raw: &mut [u8], config: &NvList) -> Result<usize, NvListError> {
    config.pack_into(&mut raw[config_window()])
}
