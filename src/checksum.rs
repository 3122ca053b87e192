//! Positional label checksums and byte-order inference.
//!
//! A protected region ends in an embedded checksum trailer. The checksum is
//! computed over the whole region with the trailer's checksum words replaced
//! by a verifier derived from the region's absolute device offset, so a
//! region copied to the wrong place fails verification even when its payload
//! is intact.

use crate::config::ZEC_MAGIC;
use crate::error::SlotError;
use crate::label::byteorder::ByteOrder;
use crate::label::trailer::{verifier, ChecksumTrailer, ChecksumWords};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Keyed checksum primitive over a region with its verifier in place.
pub trait LabelChecksum {
    /// Compute the checksum words for `data`, written in `order`.
    fn compute(&self, data: &[u8], order: ByteOrder) -> ChecksumWords;

    /// Name of this primitive (for logging).
    fn name(&self) -> &'static str;
}

/// SHA-256 label checksum.
///
/// The digest is taken over raw bytes, so both byte orders share one
/// implementation; words are the big-endian reading of each 8-byte chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Label;

impl LabelChecksum for Sha256Label {
    fn compute(&self, data: &[u8], _order: ByteOrder) -> ChecksumWords {
        let digest = Sha256::digest(data);
        let mut words = [0u64; 4];
        for (word, chunk) in words.iter_mut().zip(digest.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *word = u64::from_be_bytes(raw);
        }
        words
    }

    fn name(&self) -> &'static str {
        "sha256"
    }
}

/// How the engine should settle the region's byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderHint {
    /// Infer from the trailer magic; it must already be finalized.
    Infer,
    /// Use a sibling region's order; a zero magic is stamped on the fly.
    Inherit(ByteOrder),
}

/// Outcome of verifying one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// The stored checksum was wrong; the region now holds the fix.
    pub corrupt: bool,
    /// Byte order the region was written in.
    pub order: ByteOrder,
}

impl Verdict {
    /// Whether the region is in the opposite order from the host.
    pub fn byteswap(&self) -> bool {
        self.order.is_swapped()
    }
}

/// Verify a region's trailer and repair it in place if it is wrong.
///
/// When the stored checksum already matches, the region is left exactly as
/// it was and `corrupt` is false. Otherwise the trailer receives the
/// finalized magic and the freshly computed checksum, both in the region's
/// byte order, and `corrupt` is true.
pub fn verify_and_repair(
    region: &mut [u8],
    offset: u64,
    hint: OrderHint,
    primitive: &dyn LabelChecksum,
    name: &'static str,
) -> Result<Verdict, SlotError> {
    let mut eck = ChecksumTrailer::read(region)
        .ok_or(SlotError::IndeterminateFormat { region: name, magic: 0 })?;
    let original = eck.clone();

    let order = match hint {
        OrderHint::Infer => ByteOrder::detect(eck.raw_magic(), ZEC_MAGIC),
        OrderHint::Inherit(order) if eck.magic_is_zero() => {
            eck.set_magic(order, ZEC_MAGIC);
            Some(order)
        }
        OrderHint::Inherit(order) => Some(order).filter(|o| eck.magic(*o) == ZEC_MAGIC),
    }
    .ok_or_else(|| SlotError::IndeterminateFormat {
        region: name,
        magic: u64::from_le_bytes(eck.raw_magic()),
    })?;

    let expected = eck.checksum(order);
    eck.set_checksum(order, &verifier(offset));
    eck.write_to(region);

    let actual = primitive.compute(region, order);
    if actual == expected {
        original.write_to(region);
        debug!(region = name, offset, %order, "checksum verified");
        return Ok(Verdict {
            corrupt: false,
            order,
        });
    }

    debug!(
        region = name,
        offset,
        %order,
        expected = %words_hex(&expected),
        actual = %words_hex(&actual),
        "checksum mismatch"
    );
    eck.set_magic(order, ZEC_MAGIC);
    eck.set_checksum(order, &actual);
    eck.write_to(region);
    Ok(Verdict {
        corrupt: true,
        order,
    })
}

/// Unconditionally finalize a region's trailer in `order`.
///
/// Regions too small to hold a trailer are left alone.
pub fn seal(region: &mut [u8], offset: u64, order: ByteOrder, primitive: &dyn LabelChecksum) {
    let Some(mut eck) = ChecksumTrailer::read(region) else {
        return;
    };
    eck.set_magic(order, ZEC_MAGIC);
    eck.set_checksum(order, &verifier(offset));
    eck.write_to(region);

    let actual = primitive.compute(region, order);
    eck.set_checksum(order, &actual);
    eck.write_to(region);
}

/// Render checksum words for logs.
pub fn words_hex(words: &ChecksumWords) -> String {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    hex::encode(bytes)
}
