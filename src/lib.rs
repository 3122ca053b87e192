//! Vdev Label Repair
//!
//! Repairs the on-disk labels of a storage-pool device that can no longer be
//! imported because its label checksums, or the txg of its bootstrap
//! uberblock, are inconsistent. Works on raw bytes at fixed offsets and
//! never goes through a pool import.
//!
//! # Architecture
//!
//! ```text
//! Device → decode label → verify/repair checksums → write back → report
//! ```
//!
//! Each of the four labels is repaired independently, and only sub-regions
//! whose checksum was actually wrong are rewritten.
//!
//! # Example
//!
//! ```rust,no_run
//! use zlabel::repair::repair_device;
//! use std::path::Path;
//!
//! let report = repair_device(Path::new("/dev/sdb1")).unwrap();
//! print!("{}", report);
//! std::process::exit(report.exit_code());
//! ```

pub mod checksum;
pub mod config;
pub mod device;
pub mod error;
pub mod label;
pub mod repair;
pub mod report;

pub use config::Session;
pub use error::{Error, Result, SlotError};
pub use repair::{repair_device, LabelRepairer};
pub use report::{RegionStatus, RepairReport, SlotReport};
