//! Label repair orchestration.
//!
//! Each of the four slots is handled on its own: a slot that cannot be read
//! or decoded is reported and skipped, and the run moves on to the next.
//! Within a slot the uberblock and the config region are verified and
//! written independently, and only regions whose checksum was actually
//! wrong are written back.

use crate::checksum::{verify_and_repair, LabelChecksum, OrderHint, Sha256Label};
use crate::config::{keys, LABEL_COUNT, LABEL_SIZE, ZEC_MAGIC};
use crate::device::{Device, LabelLayout, StandardLayout};
use crate::error::{Result, SlotError};
use crate::label::byteorder::ByteOrder;
use crate::label::nvlist::NvValue;
use crate::label::trailer::ChecksumTrailer;
use crate::label::{self, config_region, uberblock, uberblock_region};
use crate::report::{RegionStatus, RepairReport, SlotReport};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, error, info, info_span, warn};

/// Drives repair of every label on one device.
///
/// Owns the device handle for the duration of the run.
pub struct LabelRepairer {
    device: Device,
    layout: Box<dyn LabelLayout>,
    checksum: Box<dyn LabelChecksum>,
}

/// Which sub-region of a label is being handled.
#[derive(Debug, Clone, Copy)]
enum SubRegion {
    Uberblock,
    Config,
}

impl SubRegion {
    fn name(self) -> &'static str {
        match self {
            SubRegion::Uberblock => "uberblock",
            SubRegion::Config => "config",
        }
    }
}

impl LabelRepairer {
    /// Repair with the standard label placement and SHA-256 checksums.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            layout: Box::new(StandardLayout),
            checksum: Box::new(Sha256Label),
        }
    }

    /// Use a different label placement.
    pub fn with_layout(mut self, layout: Box<dyn LabelLayout>) -> Self {
        self.layout = layout;
        self
    }

    /// Use a different checksum primitive.
    pub fn with_checksum(mut self, checksum: Box<dyn LabelChecksum>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Repair all slots and collect the results.
    pub fn run(&self) -> RepairReport {
        info!(
            device = %self.device.path().display(),
            usable_size = self.device.usable_size(),
            layout = self.layout.name(),
            checksum = self.checksum.name(),
            "repairing label checksums"
        );

        let mut report = RepairReport::new(
            self.device.path().to_path_buf(),
            self.device.raw_size(),
            self.device.usable_size(),
        );
        for slot in 0..LABEL_COUNT {
            report.push(self.repair_slot(slot));
        }

        if report.txg_disagreement {
            warn!(
                txgs = ?report.recovered_txgs(),
                "labels recovered different txgs; each label keeps its own"
            );
        }
        report
    }

    /// Repair one slot, turning every failure into a report note.
    pub fn repair_slot(&self, slot: usize) -> SlotReport {
        let offset = self.layout.offset_of(self.device.usable_size(), slot);
        let span = info_span!("label", slot, offset);
        let _guard = span.enter();

        let mut report = SlotReport::new(slot, offset);
        if let Err(e) = self.try_repair_slot(offset, &mut report) {
            if e.is_benign() {
                info!("{}", e);
            } else {
                error!("label {}: {}", slot, e);
            }
            report.note(e.to_string());
        }
        report
    }

    fn try_repair_slot(
        &self,
        offset: u64,
        report: &mut SlotReport,
    ) -> std::result::Result<(), SlotError> {
        let mut raw = self.device.read_region(offset, LABEL_SIZE as usize)?;
        let mut decoded = label::decode_label(&raw)?;
        if let Some(newest) = decoded.newest_txg() {
            debug!(newest, "ring holds other committed uberblocks");
        }

        let ub_range = uberblock_region(decoded.ub_size, 0);
        let order = slot_order(&raw, ub_range.clone())?;
        report.byte_order = Some(order);
        debug!(
            %order,
            byteswap = order.is_swapped(),
            ashift = decoded.ashift,
            ub_size = decoded.ub_size,
            "decoded label"
        );

        let birth = uberblock::root_birth(&raw[ub_range.clone()], order);
        if birth != 0 {
            check_trailers(&raw, ub_range.clone(), order)?;
            info!(txg = birth, "adopting root block pointer birth as uberblock txg");
            uberblock::set_txg(&mut raw[ub_range.clone()], order, birth);

            let cfg = &mut decoded.config;
            cfg.remove_all(keys::CREATE_TXG);
            cfg.remove_all(keys::POOL_TXG);
            cfg.insert(keys::POOL_TXG, NvValue::Uint64(birth));
            label::repack_config(&mut raw, cfg).map_err(SlotError::RepackFailure)?;
            report.recovered_txg = Some(birth);
        } else {
            debug!("root block pointer has no birth txg; leaving txg at 0");
        }

        let ub_status = self.repair_region(
            &mut raw,
            offset,
            ub_range,
            OrderHint::Inherit(order),
            SubRegion::Uberblock,
            report,
        );
        report.uberblock = ub_status;

        let config_status = self.repair_region(
            &mut raw,
            offset,
            config_region(),
            OrderHint::Infer,
            SubRegion::Config,
            report,
        );
        report.config = config_status;
        Ok(())
    }

    /// Verify one sub-region and write it back if its checksum was wrong.
    fn repair_region(
        &self,
        raw: &mut [u8],
        label_offset: u64,
        range: Range<usize>,
        hint: OrderHint,
        which: SubRegion,
        report: &mut SlotReport,
    ) -> RegionStatus {
        let offset = label_offset + range.start as u64;
        let region = &mut raw[range];

        match verify_and_repair(region, offset, hint, &*self.checksum, which.name()) {
            Ok(verdict) if verdict.corrupt => match self.device.write_region(offset, region) {
                Ok(()) => {
                    info!(
                        region = which.name(),
                        len = region.len(),
                        offset,
                        "wrote repaired region"
                    );
                    RegionStatus::Repaired
                }
                Err(e) => {
                    error!(region = which.name(), offset, "cannot write: {}", e);
                    report.note(format!("{}: cannot write: {}", which.name(), e));
                    RegionStatus::Skipped
                }
            },
            Ok(_) => {
                info!(region = which.name(), "checksum already consistent");
                RegionStatus::Skipped
            }
            Err(e) => {
                warn!(region = which.name(), "{}", e);
                report.note(e.to_string());
                RegionStatus::Skipped
            }
        }
    }
}

/// Settle the byte order of a slot.
///
/// The config trailer decides when it is finalized; otherwise the target
/// uberblock's own magic is consulted.
fn slot_order(raw: &[u8], ub_range: Range<usize>) -> std::result::Result<ByteOrder, SlotError> {
    let config_magic = ChecksumTrailer::read(&raw[config_region()])
        .map(|eck| eck.raw_magic())
        .unwrap_or_default();
    if let Some(order) = ByteOrder::detect(config_magic, ZEC_MAGIC) {
        return Ok(order);
    }
    if let Some(order) = uberblock::detect_order(&raw[ub_range]) {
        debug!(%order, "config trailer not finalized; using uberblock magic");
        return Ok(order);
    }
    Err(SlotError::IndeterminateFormat {
        region: "label",
        magic: u64::from_le_bytes(config_magic),
    })
}

/// Require both trailers of a slot to be finalizable in `order`.
///
/// A recovered txg has to land in both regions, so the slot is refused
/// outright when either trailer is foreign.
fn check_trailers(
    raw: &[u8],
    ub_range: Range<usize>,
    order: ByteOrder,
) -> std::result::Result<(), SlotError> {
    let unrecognised = |region: &'static str, eck: Option<ChecksumTrailer>| {
        SlotError::IndeterminateFormat {
            region,
            magic: eck.map_or(0, |eck| u64::from_le_bytes(eck.raw_magic())),
        }
    };

    let ub = ChecksumTrailer::read(&raw[ub_range]);
    if !matches!(&ub, Some(eck) if eck.magic_is_zero() || eck.magic(order) == ZEC_MAGIC) {
        return Err(unrecognised("uberblock", ub));
    }
    let config = ChecksumTrailer::read(&raw[config_region()]);
    if !matches!(&config, Some(eck) if eck.magic(order) == ZEC_MAGIC) {
        return Err(unrecognised("config", config));
    }
    Ok(())
}

/// Open `path` and repair every label on it.
///
/// Only failing to open or size the device is an error; per-slot problems
/// are carried in the report.
pub fn repair_device(path: &Path) -> Result<RepairReport> {
    let device = Device::open(path)?;
    Ok(LabelRepairer::new(device).run())
}
