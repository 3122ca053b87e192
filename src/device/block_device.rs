//! Positional read/write on a block device or image file.

use crate::config::{LABEL_COUNT, LABEL_SIZE};
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom};
use std::os::unix::fs::{FileExt, FileTypeExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Open handle on the device being repaired.
///
/// Holds the one file descriptor used for the whole run; it is closed when
/// the handle is dropped.
#[derive(Debug)]
pub struct Device {
    file: File,
    path: PathBuf,
    raw_size: u64,
    usable_size: u64,
}

impl Device {
    /// Open a device read-write and determine its usable size.
    pub fn open(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| open_error(path, e))?;
        let kind = metadata.file_type();
        if !(kind.is_file() || kind.is_block_device()) {
            return Err(Error::NotBlockLike(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;

        // Block devices report zero in their metadata; seeking to the end
        // works for both kinds.
        let raw_size = file.seek(SeekFrom::End(0))?;
        debug!(path = %path.display(), raw_size, "opened device");
        if raw_size == 0 {
            return Err(Error::NotBlockLike(path.to_path_buf()));
        }

        let usable_size = usable_size(raw_size);
        if usable_size != raw_size {
            warn!(
                raw_size,
                usable_size,
                "size is not divisible by {}, recalculated", LABEL_SIZE
            );
        }

        let required = LABEL_COUNT as u64 * LABEL_SIZE;
        if usable_size < required {
            return Err(Error::DeviceTooSmall {
                usable: usable_size,
                required,
            });
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            raw_size,
            usable_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte length reported by the device.
    pub fn raw_size(&self) -> u64 {
        self.raw_size
    }

    /// Length rounded down to whole label regions.
    pub fn usable_size(&self) -> u64 {
        self.usable_size
    }

    /// Read exactly `len` bytes at `offset`.
    pub fn read_region(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut done = 0;
        while done < len {
            match self.file.read_at(&mut buf[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        if done != len {
            return Err(Error::ShortRead {
                offset,
                wanted: len,
                got: done,
            });
        }
        Ok(buf)
    }

    /// Write `data` at `offset` and flush it to stable storage.
    pub fn write_region(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < data.len() {
            match self.file.write_at(&data[done..], offset + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        if done != data.len() {
            return Err(Error::ShortWrite {
                offset,
                wanted: data.len(),
                wrote: done,
            });
        }
        self.file.sync_data()?;
        Ok(())
    }
}

/// Round a raw length down to a whole number of label regions.
pub fn usable_size(raw_size: u64) -> u64 {
    (raw_size / LABEL_SIZE) * LABEL_SIZE
}

fn open_error(path: &Path, e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::NotFound => Error::DeviceNotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => Error::PermissionDenied(format!(
            "Cannot open {} for writing. Try running with sudo.",
            path.display()
        )),
        _ => Error::Io(e),
    }
}
