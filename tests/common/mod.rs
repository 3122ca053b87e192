//! Shared helpers for building label images on disk.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zlabel::checksum::{seal, LabelChecksum, Sha256Label};
use zlabel::config::{LABEL_COUNT, LABEL_SIZE, UBERBLOCK_MAGIC};
use zlabel::device::{LabelLayout, StandardLayout};
use zlabel::label::byteorder::ByteOrder;
use zlabel::label::nvlist::{NvList, NvValue};
use zlabel::label::uberblock::{
    BP_BIRTH_OFFSET, UB_GUID_SUM_OFFSET, UB_MAGIC_OFFSET, UB_ROOTBP_OFFSET, UB_TIMESTAMP_OFFSET,
    UB_VERSION_OFFSET,
};
use zlabel::label::{config_region, repack_config, uberblock_region};

pub const ASHIFT: u64 = 12;
pub const UB_SIZE: usize = 4096;
pub const IMAGE_SIZE: u64 = 8 * LABEL_SIZE;

/// How one label should be laid down.
#[derive(Debug, Clone, Copy)]
pub struct LabelFixture {
    pub order: ByteOrder,
    /// Logical birth of the root block pointer in ring entry 0.
    pub birth: u64,
    /// Finalize the uberblock trailer; otherwise leave it zeroed.
    pub seal_uberblock: bool,
}

impl Default for LabelFixture {
    fn default() -> Self {
        Self {
            order: ByteOrder::Little,
            birth: 0,
            seal_uberblock: true,
        }
    }
}

pub fn label_config() -> NvList {
    let tree = NvList::new()
        .with("type", NvValue::String("disk".into()))
        .with("id", NvValue::Uint64(0))
        .with("guid", NvValue::Uint64(0x1234_5678_9abc_def0))
        .with("path", NvValue::String("/dev/sdb1".into()))
        .with("ashift", NvValue::Uint64(ASHIFT));
    NvList::new()
        .with("version", NvValue::Uint64(5000))
        .with("name", NvValue::String("tank".into()))
        .with("state", NvValue::Uint64(0))
        .with("txg", NvValue::Uint64(0))
        .with("pool_guid", NvValue::Uint64(0x0fed_cba9_8765_4321))
        .with("create_txg", NvValue::Uint64(4))
        .with("vdev_tree", NvValue::NvList(tree))
}

/// Build a label that would verify at absolute `offset`.
pub fn build_label(offset: u64, fixture: &LabelFixture) -> Vec<u8> {
    build_label_with(offset, fixture, &label_config())
}

pub fn build_label_with(offset: u64, fixture: &LabelFixture, config: &NvList) -> Vec<u8> {
    build_label_using(offset, fixture, config, &Sha256Label)
}

/// Build a label whose trailers are sealed with `primitive`.
pub fn build_label_using(
    offset: u64,
    fixture: &LabelFixture,
    config: &NvList,
    primitive: &dyn LabelChecksum,
) -> Vec<u8> {
    let mut raw = vec![0u8; LABEL_SIZE as usize];
    repack_config(&mut raw, config).expect("config fits its window");

    let ub_range = uberblock_region(UB_SIZE, 0);
    {
        let ub = &mut raw[ub_range.clone()];
        fixture.order.write_u64(ub, UB_MAGIC_OFFSET, UBERBLOCK_MAGIC);
        fixture.order.write_u64(ub, UB_VERSION_OFFSET, 5000);
        fixture.order.write_u64(ub, UB_GUID_SUM_OFFSET, 0xdead_beef);
        fixture.order.write_u64(ub, UB_TIMESTAMP_OFFSET, 1_700_000_000);
        fixture.order
            .write_u64(ub, UB_ROOTBP_OFFSET + BP_BIRTH_OFFSET, fixture.birth);
    }
    if fixture.seal_uberblock {
        let ub_offset = offset + ub_range.start as u64;
        seal(&mut raw[ub_range], ub_offset, fixture.order, primitive);
    }

    let cfg_range = config_region();
    let cfg_offset = offset + cfg_range.start as u64;
    seal(&mut raw[cfg_range], cfg_offset, fixture.order, primitive);
    raw
}

/// Offsets of the four labels on an image of `raw_size` bytes.
pub fn slot_offsets(raw_size: u64) -> Vec<u64> {
    let usable = zlabel::device::usable_size(raw_size);
    (0..LABEL_COUNT)
        .map(|slot| StandardLayout.offset_of(usable, slot))
        .collect()
}

/// Write an image whose labels are produced by `make(slot, offset)`.
pub fn write_image<F>(raw_size: u64, mut make: F) -> (TempDir, PathBuf)
where
    F: FnMut(usize, u64) -> Vec<u8>,
{
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("disk.img");

    let mut image = vec![0u8; raw_size as usize];
    for (slot, offset) in slot_offsets(raw_size).into_iter().enumerate() {
        let label = make(slot, offset);
        let start = offset as usize;
        image[start..start + label.len()].copy_from_slice(&label);
    }
    fs::write(&path, &image).expect("Failed to write image");
    (dir, path)
}

/// Image with every label built from the same fixture.
pub fn uniform_image(fixture: LabelFixture) -> (TempDir, PathBuf) {
    write_image(IMAGE_SIZE, |_, offset| build_label(offset, &fixture))
}

pub fn read_label(path: &Path, offset: u64) -> Vec<u8> {
    let image = fs::read(path).expect("Failed to read image");
    let start = offset as usize;
    image[start..start + LABEL_SIZE as usize].to_vec()
}

/// Flip one byte in the unused tail of the config window.
pub fn damage_config(label: &mut [u8]) {
    let window_end = zlabel::label::config_window().end;
    label[window_end - 100] ^= 0x5a;
}
