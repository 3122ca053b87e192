//! Per-slot repair results and the process exit status.

use crate::label::byteorder::ByteOrder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// What happened to one protected sub-region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStatus {
    Repaired,
    Skipped,
}

impl RegionStatus {
    pub fn is_repaired(self) -> bool {
        self == RegionStatus::Repaired
    }
}

impl fmt::Display for RegionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionStatus::Repaired => write!(f, "repaired"),
            RegionStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome for one label slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotReport {
    /// Slot index, 0 through 3.
    pub slot: usize,
    /// Absolute offset of the label on the device.
    pub offset: u64,
    pub uberblock: RegionStatus,
    pub config: RegionStatus,
    /// Byte order the label was written in, once determined.
    pub byte_order: Option<ByteOrder>,
    /// Txg adopted from the root block pointer, if any.
    pub recovered_txg: Option<u64>,
    /// Reasons a sub-region or the whole slot was skipped.
    pub notes: Vec<String>,
}

impl SlotReport {
    pub fn new(slot: usize, offset: u64) -> Self {
        Self {
            slot,
            offset,
            uberblock: RegionStatus::Skipped,
            config: RegionStatus::Skipped,
            byte_order: None,
            recovered_txg: None,
            notes: Vec::new(),
        }
    }

    pub fn note(&mut self, msg: impl Into<String>) {
        self.notes.push(msg.into());
    }

    /// Two-bit status: bit 0 uberblock repaired, bit 1 config repaired.
    pub fn status_bits(&self) -> u32 {
        u32::from(self.uberblock.is_repaired()) | (u32::from(self.config.is_repaired()) << 1)
    }
}

/// Results for a whole device.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub device: PathBuf,
    pub raw_size: u64,
    pub usable_size: u64,
    pub slots: Vec<SlotReport>,
    /// Set when slots recovered different txgs from their root pointers.
    pub txg_disagreement: bool,
}

impl RepairReport {
    pub fn new(device: PathBuf, raw_size: u64, usable_size: u64) -> Self {
        Self {
            device,
            raw_size,
            usable_size,
            slots: Vec::new(),
            txg_disagreement: false,
        }
    }

    pub fn push(&mut self, slot: SlotReport) {
        self.slots.push(slot);
        self.txg_disagreement = self.recovered_txgs().len() > 1;
    }

    /// Distinct recovered txgs, each with the slots that adopted it.
    pub fn recovered_txgs(&self) -> BTreeMap<u64, Vec<usize>> {
        let mut seen: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for slot in &self.slots {
            if let Some(txg) = slot.recovered_txg {
                seen.entry(txg).or_default().push(slot.slot);
            }
        }
        seen
    }

    /// True if any sub-region on any slot was repaired.
    pub fn any_repaired(&self) -> bool {
        self.slots.iter().any(|s| s.status_bits() != 0)
    }

    /// Process exit status: 0 when something was repaired, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.any_repaired() {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RepairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for slot in &self.slots {
            writeln!(
                f,
                "label {}: uberblock: {} checksum: {}",
                slot.slot, slot.uberblock, slot.config
            )?;
        }
        if self.txg_disagreement {
            write!(f, "warning: labels disagree on the recovered txg:")?;
            for (txg, slots) in self.recovered_txgs() {
                let slots: Vec<String> = slots.iter().map(|s| s.to_string()).collect();
                write!(f, " {} (label {})", txg, slots.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
