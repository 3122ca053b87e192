//! Raw device access for label repair.
//!
//! Label repair never goes through the pool import path; it reads and
//! writes label regions at fixed offsets of a block device or image file.

mod block_device;
mod layout;

pub use block_device::{usable_size, Device};
pub use layout::{LabelLayout, StandardLayout};
