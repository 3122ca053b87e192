//! Placement of the four label slots on a device.

use crate::config::{LABEL_COUNT, LABEL_SIZE};

/// Maps a slot index to its absolute byte offset.
///
/// Implementations must place slots 0 and 1 near the start of the device and
/// slots 2 and 3 near the end, disjoint, each with room for a full
/// `LABEL_SIZE` read.
pub trait LabelLayout {
    /// Absolute offset of `slot` on a device of `usable_size` bytes.
    fn offset_of(&self, usable_size: u64, slot: usize) -> u64;

    /// Name of this layout (for logging).
    fn name(&self) -> &'static str;
}

/// Standard vdev placement: two labels at the front, two at the back.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardLayout;

impl LabelLayout for StandardLayout {
    fn offset_of(&self, usable_size: u64, slot: usize) -> u64 {
        debug_assert!(slot < LABEL_COUNT);
        let base = slot as u64 * LABEL_SIZE;
        if slot < LABEL_COUNT / 2 {
            base
        } else {
            base + usable_size - LABEL_COUNT as u64 * LABEL_SIZE
        }
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}
