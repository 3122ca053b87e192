//! Layout constants and per-invocation session settings.

use std::path::PathBuf;

/// Size of one vdev label region.
pub const LABEL_SIZE: u64 = 256 * 1024;

/// Number of redundant labels per device.
pub const LABEL_COUNT: usize = 4;

/// Blank space at the start of a label, followed by the boot envelope.
pub const VDEV_PAD_SIZE: usize = 8 * 1024;

/// Offset of the config (vdev_phys) region inside a label.
pub const VDEV_PHYS_OFFSET: usize = 2 * VDEV_PAD_SIZE;

/// Size of the config region, including its checksum trailer.
pub const VDEV_PHYS_SIZE: usize = 112 * 1024;

/// Offset of the uberblock ring inside a label.
pub const VDEV_UBERBLOCK_OFFSET: usize = VDEV_PHYS_OFFSET + VDEV_PHYS_SIZE;

/// Size of the uberblock ring.
pub const VDEV_UBERBLOCK_RING: usize = 128 * 1024;

/// Size of an embedded checksum trailer (`magic` + four checksum words).
pub const ECK_SIZE: usize = 40;

/// Magic stamped into a finalized checksum trailer.
pub const ZEC_MAGIC: u64 = 0x0210_da7a_b10c_7a11;

/// Magic at the head of every written uberblock.
pub const UBERBLOCK_MAGIC: u64 = 0x00ba_b10c;

/// Smallest uberblock slot shift (1 KiB).
pub const UBERBLOCK_SHIFT: u32 = 10;

/// Largest uberblock slot shift (8 KiB).
pub const MAX_UBERBLOCK_SHIFT: u32 = 13;

/// Config keys consulted by the decoder and the txg rewrite.
pub mod keys {
    pub const VERSION: &str = "version";
    pub const POOL_STATE: &str = "state";
    pub const POOL_GUID: &str = "pool_guid";
    pub const POOL_TXG: &str = "txg";
    pub const CREATE_TXG: &str = "create_txg";
    pub const VDEV_TREE: &str = "vdev_tree";
    pub const ASHIFT: &str = "ashift";
}

/// Uberblock slot shift for a given ashift.
pub fn uberblock_shift(ashift: u64) -> u32 {
    let ashift = ashift.min(u64::from(MAX_UBERBLOCK_SHIFT)) as u32;
    ashift.clamp(UBERBLOCK_SHIFT, MAX_UBERBLOCK_SHIFT)
}

/// Uberblock slot size in bytes for a given ashift.
pub fn uberblock_size(ashift: u64) -> usize {
    1usize << uberblock_shift(ashift)
}

/// Global options for one invocation.
///
/// Built once in `main` and handed to each command by reference. The import
/// search settings are only meaningful to pool-level commands; label repair
/// works on a raw device and ignores them.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Pool cache file to consult when importing.
    pub cachefile: Option<PathBuf>,
    /// Directories searched for pool devices.
    pub search_dirs: Vec<PathBuf>,
}

impl Session {
    /// Create a session from the global command-line options.
    pub fn new(cachefile: Option<PathBuf>, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            cachefile,
            search_dirs,
        }
    }

    /// Whether any import search option was supplied.
    pub fn has_import_options(&self) -> bool {
        self.cachefile.is_some() || !self.search_dirs.is_empty()
    }
}
