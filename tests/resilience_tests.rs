//! Resilience tests - damaged, misplaced and undersized labels.

mod common;

use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::TempDir;
use zlabel::checksum::LabelChecksum;
use zlabel::config::{ECK_SIZE, LABEL_SIZE};
use zlabel::device::{Device, LabelLayout, StandardLayout};
use zlabel::label::byteorder::ByteOrder;
use zlabel::label::nvlist::NvValue;
use zlabel::label::trailer::ChecksumWords;
use zlabel::label::{config_region, config_window};
use zlabel::{repair_device, Error, LabelRepairer, RegionStatus};

/// Overwrite the config window with random bytes.
fn scramble_config(label: &mut [u8], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let window = config_window();
    rng.fill(&mut label[window.clone()]);
    // Never a valid encoding byte.
    label[window.start] = 0xee;
}

#[test]
fn test_scrambled_slot_is_isolated() {
    let fixture = LabelFixture::default();
    let (_dir, path) = write_image(IMAGE_SIZE, |slot, offset| {
        let mut label = build_label(offset, &fixture);
        damage_config(&mut label);
        if slot == 2 {
            scramble_config(&mut label, 0x5eed);
        }
        label
    });
    let scrambled_offset = slot_offsets(IMAGE_SIZE)[2];
    let before = read_label(&path, scrambled_offset);

    let report = repair_device(&path).expect("Failed to repair");

    for slot in &report.slots {
        if slot.slot == 2 {
            assert_eq!(slot.status_bits(), 0);
            assert!(slot.notes[0].contains("cannot unpack nvlist"));
        } else {
            assert_eq!(slot.config, RegionStatus::Repaired);
            assert!(slot.notes.is_empty());
        }
    }
    assert_eq!(report.exit_code(), 0);
    assert_eq!(read_label(&path, scrambled_offset), before);
}

#[test]
fn test_label_copied_to_wrong_slot() {
    let fixture = LabelFixture::default();
    let (_dir, path) = write_image(IMAGE_SIZE, |slot, offset| {
        // Slot 1 holds a byte-exact copy of slot 0.
        let at = if slot == 1 { 0 } else { offset };
        build_label(at, &fixture)
    });

    let report = repair_device(&path).expect("Failed to repair");

    let bits: Vec<u32> = report.slots.iter().map(|s| s.status_bits()).collect();
    assert_eq!(bits, vec![0, 3, 0, 0]);

    let second = repair_device(&path).expect("Failed to repair");
    assert!(!second.any_repaired());
}

#[test]
fn test_unaligned_device_size() {
    let raw_size = IMAGE_SIZE + 1000;
    let fixture = LabelFixture::default();
    let (_dir, path) = write_image(raw_size, |_, offset| {
        let mut label = build_label(offset, &fixture);
        damage_config(&mut label);
        label
    });

    let report = repair_device(&path).expect("Failed to repair");
    assert_eq!(report.raw_size, raw_size);
    assert_eq!(report.usable_size, IMAGE_SIZE);
    assert_eq!(report.slots[3].offset, IMAGE_SIZE - LABEL_SIZE);
    assert!(report.slots.iter().all(|s| s.config.is_repaired()));
}

#[test]
fn test_device_too_small() {
    let (_dir, path) = write_image(4 * LABEL_SIZE, |_, offset| {
        build_label(offset, &LabelFixture::default())
    });
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(3 * LABEL_SIZE + 512).unwrap();

    match repair_device(&path) {
        Err(Error::DeviceTooSmall { usable, required }) => {
            assert_eq!(usable, 3 * LABEL_SIZE);
            assert_eq!(required, 4 * LABEL_SIZE);
        }
        other => panic!("expected DeviceTooSmall, got {:?}", other.map(|r| r.exit_code())),
    }
}

#[test]
fn test_missing_device() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.img");
    assert!(matches!(
        repair_device(&missing),
        Err(Error::DeviceNotFound(p)) if p == missing
    ));
}

#[test]
fn test_directory_is_not_a_device() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        repair_device(dir.path()),
        Err(Error::NotBlockLike(_))
    ));
}

#[test]
fn test_missing_required_key() {
    let fixture = LabelFixture::default();
    let (_dir, path) = write_image(IMAGE_SIZE, |slot, offset| {
        let mut config = label_config();
        if slot == 3 {
            config.remove_all("pool_guid");
        }
        let mut label = build_label_with(offset, &fixture, &config);
        damage_config(&mut label);
        label
    });

    let report = repair_device(&path).expect("Failed to repair");
    assert_eq!(report.slots[3].status_bits(), 0);
    assert_eq!(report.slots[3].notes, vec!["nvlist key pool_guid not found"]);
    assert!(report.slots[..3].iter().all(|s| s.config.is_repaired()));
}

#[test]
fn test_zero_ashift_rejected() {
    let fixture = LabelFixture::default();
    let mut config = label_config();
    if let Some(NvValue::NvList(tree)) = config.get("vdev_tree").cloned() {
        config.insert("vdev_tree", NvValue::NvList(tree.with("ashift", NvValue::Uint64(0))));
    }
    let (_dir, path) = write_image(IMAGE_SIZE, |_, offset| {
        build_label_with(offset, &fixture, &config)
    });

    let report = repair_device(&path).expect("Failed to repair");
    for slot in &report.slots {
        assert_eq!(slot.notes, vec!["nvlist key ashift is zero"]);
    }
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_unrecognised_config_magic() {
    let fixture = LabelFixture::default();
    let (_dir, path) = write_image(IMAGE_SIZE, |slot, offset| {
        let mut label = build_label(offset, &fixture);
        if slot == 0 {
            let magic_at = config_region().end - ECK_SIZE;
            label[magic_at..magic_at + 8].copy_from_slice(&[0xab; 8]);
        }
        label
    });
    let before = read_label(&path, 0);

    let report = repair_device(&path).expect("Failed to repair");
    let slot0 = &report.slots[0];
    assert_eq!(slot0.byte_order, Some(ByteOrder::Little));
    assert_eq!(slot0.status_bits(), 0);
    assert!(slot0.notes[0].contains("matches neither byte order"));
    assert_eq!(read_label(&path, 0), before);
}

#[test]
fn test_unrecognised_trailers_block_txg_adoption() {
    let fixture = LabelFixture {
        birth: 4200,
        seal_uberblock: false,
        ..LabelFixture::default()
    };
    let (_dir, path) = write_image(IMAGE_SIZE, |slot, offset| {
        let mut label = build_label(offset, &fixture);
        if slot == 1 {
            let magic_at = config_region().end - ECK_SIZE;
            label[magic_at..magic_at + 8].copy_from_slice(&[0xab; 8]);
        }
        label
    });

    let refused_offset = slot_offsets(IMAGE_SIZE)[1];
    let before = read_label(&path, refused_offset);

    let report = repair_device(&path).expect("Failed to repair");
    let refused = &report.slots[1];
    assert_eq!(refused.recovered_txg, None);
    assert_eq!(refused.status_bits(), 0);
    assert!(refused.notes[0].contains("config checksum magic 0xabababababababab"));
    assert_eq!(read_label(&path, refused_offset), before);

    for slot in [0, 2, 3] {
        assert_eq!(report.slots[slot].recovered_txg, Some(4200));
        assert_eq!(report.slots[slot].status_bits(), 3);
    }
    assert!(!report.txg_disagreement);
    assert_eq!(report.exit_code(), 0);
}

/// Standard placement, except one slot lands past the end of the device.
struct PastEndLayout {
    slot: usize,
}

impl LabelLayout for PastEndLayout {
    fn offset_of(&self, usable_size: u64, slot: usize) -> u64 {
        if slot == self.slot {
            usable_size
        } else {
            StandardLayout.offset_of(usable_size, slot)
        }
    }

    fn name(&self) -> &'static str {
        "past-end"
    }
}

#[test]
fn test_short_read_fails_only_its_slot() {
    let fixture = LabelFixture::default();
    let (_dir, path) = write_image(IMAGE_SIZE, |slot, offset| {
        let mut label = build_label(offset, &fixture);
        if slot == 1 {
            damage_config(&mut label);
        }
        label
    });

    let run = || {
        let device = Device::open(&path).expect("Failed to open image");
        LabelRepairer::new(device)
            .with_layout(Box::new(PastEndLayout { slot: 3 }))
            .run()
    };

    let report = run();
    assert_eq!(report.slots.len(), 4);
    assert_eq!(report.slots[3].offset, IMAGE_SIZE);
    assert!(report.slots[3].notes[0].contains("Short read"));
    let bits: Vec<u32> = report.slots.iter().map(|s| s.status_bits()).collect();
    assert_eq!(bits, vec![0, 2, 0, 0]);
    assert_eq!(report.exit_code(), 0);

    let second = run();
    assert!(second.slots[3].notes[0].contains("Short read"));
    assert!(second.slots[..3].iter().all(|s| s.notes.is_empty()));
    assert_eq!(second.exit_code(), 1);
}

/// XOR of the region's 8-byte words, folded into four lanes.
struct XorFold;

impl LabelChecksum for XorFold {
    fn compute(&self, data: &[u8], _order: ByteOrder) -> ChecksumWords {
        let mut words = [0u64; 4];
        for (i, chunk) in data.chunks(8).enumerate() {
            let mut raw = [0u8; 8];
            raw[..chunk.len()].copy_from_slice(chunk);
            words[i % 4] ^= u64::from_le_bytes(raw);
        }
        words
    }

    fn name(&self) -> &'static str {
        "xor-fold"
    }
}

#[test]
fn test_custom_checksum_primitive() {
    let fixture = LabelFixture::default();
    let config = label_config();
    let (_dir, path) = write_image(IMAGE_SIZE, |slot, offset| {
        let mut label = build_label_using(offset, &fixture, &config, &XorFold);
        if slot == 2 {
            damage_config(&mut label);
        }
        label
    });

    let device = Device::open(&path).expect("Failed to open image");
    let report = LabelRepairer::new(device)
        .with_checksum(Box::new(XorFold))
        .run();

    let bits: Vec<u32> = report.slots.iter().map(|s| s.status_bits()).collect();
    assert_eq!(bits, vec![0, 0, 2, 0]);

    // The default primitive disagrees with every trailer on the image.
    let sha = repair_device(&path).expect("Failed to repair");
    assert!(sha.slots.iter().all(|s| s.status_bits() == 3));
}

#[test]
fn test_config_too_full_for_txg() {
    let mut config = label_config();
    config.remove_all("txg");
    config.remove_all("create_txg");
    // A string pair named "comment" packs to 32 bytes plus its padded payload.
    let fill = config_window().len() - config.packed_size() - 32;
    config.insert("comment", NvValue::String("x".repeat(fill)));
    assert_eq!(config.packed_size(), config_window().len());

    let fixture = LabelFixture {
        birth: 4200,
        seal_uberblock: false,
        ..LabelFixture::default()
    };
    let (_dir, path) = write_image(IMAGE_SIZE, |_, offset| {
        build_label_with(offset, &fixture, &config)
    });
    let before = fs::read(&path).unwrap();

    let report = repair_device(&path).expect("Failed to repair");
    for slot in &report.slots {
        assert_eq!(slot.status_bits(), 0);
        assert_eq!(slot.recovered_txg, None);
        assert!(slot.notes[0].starts_with("failed to pack nvlist"));
    }
    assert_eq!(report.exit_code(), 1);
    assert_eq!(fs::read(&path).unwrap(), before);
}
