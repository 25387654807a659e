//! Target resolution, opening and teardown.
//!
//! A target path may name a directory (an anonymous temporary file is
//! measured inside it), a path that does not exist yet (a uniquely named
//! temporary file is created next to it and removed afterwards), a
//! regular file, or a block device.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::buffer::IO_ALIGN;
use crate::config::{IoMode, MeasureConfig};
use crate::error::MeasureError;

/// What a target path resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Directory,
    BlockDevice,
    File,
    /// Nothing exists at the path yet.
    Fresh,
}

impl TargetKind {
    /// Inspect `path` without opening it.
    pub fn resolve(path: &Path) -> Result<Self, MeasureError> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(Self::Directory),
            Ok(meta) if meta.file_type().is_block_device() => Ok(Self::BlockDevice),
            Ok(_) => Ok(Self::File),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::Fresh),
            Err(source) => Err(MeasureError::Open {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Whether the run created the backing file and must remove it.
    pub fn is_temporary(self) -> bool {
        matches!(self, Self::Directory | Self::Fresh)
    }
}

#[derive(Debug)]
enum Handle {
    Plain(File),
    Named(NamedTempFile),
}

/// An opened target, ready for sampling.
///
/// Dropping it closes the handle, removes any temporary file and releases
/// the device lock; [`OpenTarget::close`] does the same but reports
/// failures.
#[derive(Debug)]
pub struct OpenTarget {
    path: PathBuf,
    display: String,
    kind: TargetKind,
    handle: Handle,
    device_lock: Option<File>,
}

impl OpenTarget {
    /// Resolve and open `path` for the configured mode.
    pub fn open(path: &Path, config: &MeasureConfig) -> Result<Self, MeasureError> {
        let kind = TargetKind::resolve(path)?;
        let shown = path.display().to_string();
        debug!(target_path = %shown, ?kind, mode = %config.mode, "Resolved target");

        // Taken before the sampling handle so a second writer fails early.
        let device_lock = if kind == TargetKind::BlockDevice && config.mode == IoMode::Write {
            Some(lock_device(path)?)
        } else {
            None
        };

        let handle = match kind {
            TargetKind::Directory => {
                let file = tempfile::tempfile_in(path).map_err(|source| MeasureError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
                Handle::Plain(file)
            }
            TargetKind::Fresh => Handle::Named(create_named(path)?),
            TargetKind::File | TargetKind::BlockDevice => {
                Handle::Plain(open_existing(path, kind, config)?)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            display: shown,
            kind,
            handle,
            device_lock,
        })
    }

    pub fn file(&self) -> &File {
        match &self.handle {
            Handle::Plain(file) => file,
            Handle::Named(named) => named.as_file(),
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display
    }

    /// Path of the temporary file created for a fresh target.
    pub fn temp_path(&self) -> Option<&Path> {
        match &self.handle {
            Handle::Named(named) => Some(named.path()),
            Handle::Plain(_) => None,
        }
    }

    pub fn holds_device_lock(&self) -> bool {
        self.device_lock.is_some()
    }

    /// Load the target's first block into `buf`.
    ///
    /// Write-mode samples then rewrite exactly the bytes that were already
    /// there. A target shorter than the block is extended (never
    /// truncated); a block device that is too small is an error.
    pub fn load_block(&self, buf: &mut [u8]) -> Result<(), MeasureError> {
        let expected = buf.len();
        let file = self.file();
        let read = file
            .read_at(buf, 0)
            .map_err(|e| MeasureError::io("pread", e))?;
        if read >= expected {
            return Ok(());
        }

        if self.kind == TargetKind::BlockDevice {
            return Err(MeasureError::ShortTransfer {
                op: "pread",
                expected,
                actual: read,
            });
        }

        debug!(
            target_path = %self.display,
            existing = read,
            block = expected,
            "Extending target to block size"
        );
        file.write_all_at(buf, 0)
            .map_err(|e| MeasureError::io("pwrite", e))
    }

    /// Close the handle, remove temporary files and release the device lock.
    pub fn close(self) -> Result<(), MeasureError> {
        let Self {
            display: shown,
            handle,
            device_lock,
            ..
        } = self;

        match handle {
            Handle::Plain(file) => drop(file),
            Handle::Named(named) => {
                named.close().map_err(|e| MeasureError::io("unlink", e))?;
            }
        }
        drop(device_lock);

        debug!(target_path = %shown, "Target closed");
        Ok(())
    }
}

fn lock_device(path: &Path) -> Result<File, MeasureError> {
    // O_EXCL without O_CREAT on a block device requests exclusive use.
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_EXCL)
        .open(path)
        .map_err(|source| MeasureError::DeviceLock {
            path: path.to_path_buf(),
            source,
        })
}

fn create_named(path: &Path) -> Result<NamedTempFile, MeasureError> {
    let invalid = || MeasureError::Open {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "target has no file name"),
    };
    let name = path.file_name().ok_or_else(invalid)?.to_string_lossy();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    tempfile::Builder::new()
        .prefix(&format!("{name}-"))
        .tempfile_in(parent)
        .map_err(|source| MeasureError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn open_existing(
    path: &Path,
    kind: TargetKind,
    config: &MeasureConfig,
) -> Result<File, MeasureError> {
    let short_file = kind == TargetKind::File
        && fs::metadata(path).is_ok_and(|meta| meta.len() < config.block_size);
    let writable = config.mode == IoMode::Write || short_file;
    let direct = wants_direct_io(config);

    let opened = match open_with(path, writable, direct) {
        Err(e) if direct && e.raw_os_error() == Some(libc::EINVAL) => {
            warn!(
                target_path = %path.display(),
                error = %e,
                "Direct I/O rejected, falling back to buffered reads"
            );
            open_with(path, writable, false)
        }
        other => other,
    };
    opened.map_err(|source| MeasureError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn wants_direct_io(config: &MeasureConfig) -> bool {
    cfg!(target_os = "linux")
        && config.direct_io
        && config.mode == IoMode::Read
        && config.block_size % IO_ALIGN as u64 == 0
}

fn open_with(path: &Path, writable: bool, direct: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(writable);
    if direct {
        options.custom_flags(direct_flag());
    }
    options.open(path)
}

#[cfg(target_os = "linux")]
fn direct_flag() -> i32 {
    libc::O_DIRECT
}

#[cfg(not(target_os = "linux"))]
fn direct_flag() -> i32 {
    0
}
