//! Embedded checksum trailer at the tail of a protected region.
//!
//! Layout, relative to the trailer start:
//!
//! ```text
//! 0    magic       u64
//! 8    checksum    [u64; 4]
//! ```

use crate::config::ECK_SIZE;
use crate::label::byteorder::{raw_u64, ByteOrder};

/// Four checksum words, host order.
pub type ChecksumWords = [u64; 4];

const MAGIC_OFFSET: usize = 0;
const CKSUM_OFFSET: usize = 8;

/// Copy of a region's trailer bytes, edited before being written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumTrailer {
    raw: [u8; ECK_SIZE],
}

impl ChecksumTrailer {
    /// Read the trailer from the last `ECK_SIZE` bytes of `region`.
    ///
    /// Returns `None` if the region cannot hold a trailer.
    pub fn read(region: &[u8]) -> Option<Self> {
        let start = region.len().checked_sub(ECK_SIZE)?;
        let mut raw = [0u8; ECK_SIZE];
        raw.copy_from_slice(&region[start..]);
        Some(Self { raw })
    }

    /// Store the trailer back into the tail of `region`.
    ///
    /// `region` must be the one it was read from.
    pub fn write_to(&self, region: &mut [u8]) {
        let start = region.len() - ECK_SIZE;
        region[start..].copy_from_slice(&self.raw);
    }

    /// Magic bytes exactly as stored.
    pub fn raw_magic(&self) -> [u8; 8] {
        raw_u64(&self.raw, MAGIC_OFFSET)
    }

    /// True when the trailer was never finalized.
    pub fn magic_is_zero(&self) -> bool {
        self.raw_magic() == [0u8; 8]
    }

    pub fn magic(&self, order: ByteOrder) -> u64 {
        order.read_u64(&self.raw, MAGIC_OFFSET)
    }

    pub fn set_magic(&mut self, order: ByteOrder, magic: u64) {
        order.write_u64(&mut self.raw, MAGIC_OFFSET, magic);
    }

    pub fn checksum(&self, order: ByteOrder) -> ChecksumWords {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            *word = order.read_u64(&self.raw, CKSUM_OFFSET + i * 8);
        }
        words
    }

    pub fn set_checksum(&mut self, order: ByteOrder, words: &ChecksumWords) {
        for (i, word) in words.iter().enumerate() {
            order.write_u64(&mut self.raw, CKSUM_OFFSET + i * 8, *word);
        }
    }
}

/// Verifier seeded into the checksum field while computing.
///
/// Binds the checksum to the region's absolute device offset.
pub fn verifier(offset: u64) -> ChecksumWords {
    [offset, 0, 0, 0]
}
