//! Error types for label repair.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for device and run-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the device accessor.
///
/// Only failures to open the device or to size it abort a run; every other
/// variant is scoped to one slot by the orchestrator.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during device access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Device path does not exist.
    #[error("Device not found: {0}")]
    DeviceNotFound(PathBuf),

    /// Insufficient privileges to open the device read-write.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Target is not something label slots can live on.
    #[error("Not a block device or regular file: {0}")]
    NotBlockLike(PathBuf),

    /// Usable size cannot hold all four label slots.
    #[error("Device too small: {usable} usable bytes, need at least {required}")]
    DeviceTooSmall { usable: u64, required: u64 },

    /// Fewer bytes came back than were requested.
    #[error("Short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: usize, got: usize },

    /// Fewer bytes were written than were requested.
    #[error("Short write at offset {offset}: wanted {wanted} bytes, wrote {wrote}")]
    ShortWrite {
        offset: u64,
        wanted: usize,
        wrote: usize,
    },
}

/// Failures scoped to a single label slot or sub-region.
#[derive(Error, Debug)]
pub enum SlotError {
    /// Device read failed for this slot.
    #[error("cannot read label: {0}")]
    Io(#[from] Error),

    /// Target uberblock already carries a txg; nothing to do.
    #[error("UB TXG of 0 expected, but got {txg}")]
    AlreadyFinalized { txg: u64 },

    /// The config nvlist could not be unpacked.
    #[error("cannot unpack nvlist: {0}")]
    ConfigUnparseable(#[source] NvListError),

    /// A required key is missing or unusable.
    #[error("nvlist key {key} {reason}")]
    ConfigIncomplete { key: &'static str, reason: &'static str },

    /// Checksum magic matches neither byte order.
    #[error("{region} checksum magic {magic:#018x} matches neither byte order")]
    IndeterminateFormat { region: &'static str, magic: u64 },

    /// The modified config no longer fits its window.
    #[error("failed to pack nvlist: {0}")]
    RepackFailure(#[source] NvListError),
}

impl SlotError {
    /// Whether this outcome means the slot simply needed no work.
    pub fn is_benign(&self) -> bool {
        matches!(self, SlotError::AlreadyFinalized { .. })
    }
}

/// Errors from the XDR nvlist codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NvListError {
    /// Ran off the end of the input.
    #[error("truncated at byte {0}")]
    Truncated(usize),

    /// Header names an encoding other than XDR.
    #[error("unsupported encoding {0}")]
    UnsupportedEncoding(u8),

    /// Pair carries a data type the codec does not understand.
    #[error("unsupported data type {kind} for pair {name:?}")]
    UnsupportedType { name: String, kind: i32 },

    /// A length or size field is out of range.
    #[error("malformed field at byte {offset}: {what}")]
    Malformed { offset: usize, what: &'static str },

    /// Name or string value is not valid UTF-8.
    #[error("invalid string at byte {0}")]
    InvalidString(usize),

    /// Nesting goes deeper than the decoder allows.
    #[error("nvlist nesting exceeds {0} levels")]
    TooDeep(usize),

    /// Packed form does not fit the destination window.
    #[error("packed size {needed} exceeds buffer of {available} bytes")]
    BufferTooSmall { needed: usize, available: usize },
}
