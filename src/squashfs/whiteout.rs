//! Whiteout markers - how a squashfs layer encodes deletions.
//!
//! Overlay's convention is a character device 0/0 at the deleted path.
//! Since mksquashfs archives the live rootfs, the markers have to be
//! written into the real filesystem for the duration of the pack and
//! removed afterwards. Without privilege to create device nodes, the
//! AUFS convention (an empty `.wh.<name>` file beside the deleted path)
//! is used instead; both are understood by the overlay driver.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::stat::{makedev, mknod, Mode, SFlag};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Prefix of an AUFS-style whiteout sidecar file.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// What `place` ended up creating for a deleted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Character device 0/0 at the deleted path itself.
    DeviceNode(PathBuf),
    /// Sidecar file in the deleted path's parent directory.
    Sidecar(PathBuf),
    /// Nothing: the parent is gone too, its own marker covers this path.
    Skipped,
}

/// Markers placed in a live rootfs, with deferred removal.
///
/// Removal runs on drop as well, so the rootfs is cleaned up on every
/// exit path; a marker left behind would be archived into the *next*
/// layer as a deletion that never happened.
#[derive(Debug, Default)]
pub struct Whiteouts {
    markers: Vec<PathBuf>,
}

impl Whiteouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a deletion marker for `path` (absolute host path).
    ///
    /// ENOENT and ENOTDIR from mknod mean an ancestor was deleted as well
    /// and already carries a marker, so the path is skipped. Every other
    /// failure (typically EPERM without CAP_MKNOD) falls back to the
    /// sidecar form, which is left in place after archiving.
    pub fn place(&mut self, path: &Path) -> Result<Marker> {
        self.markers.push(path.to_path_buf());

        match mknod(path, SFlag::S_IFCHR, Mode::empty(), makedev(0, 0)) {
            Ok(()) => Ok(Marker::DeviceNode(path.to_path_buf())),
            Err(Errno::ENOENT) | Err(Errno::ENOTDIR) => Ok(Marker::Skipped),
            Err(_) => {
                let name = path
                    .file_name()
                    .with_context(|| format!("no basename for whiteout of {}", path.display()))?;
                let mut sidecar_name = std::ffi::OsString::from(WHITEOUT_PREFIX);
                sidecar_name.push(name);
                let sidecar = path
                    .parent()
                    .unwrap_or_else(|| Path::new("/"))
                    .join(sidecar_name);

                File::create(&sidecar).with_context(|| {
                    format!("couldn't create whiteout for {}", path.display())
                })?;
                Ok(Marker::Sidecar(sidecar))
            }
        }
    }

    /// Remove every device-node marker, newest first. Paths that were
    /// skipped or replaced by a sidecar simply fail the unlink silently.
    pub fn cleanup(&mut self) {
        while let Some(path) = self.markers.pop() {
            let _ = fs::remove_file(&path);
        }
    }
}

impl Drop for Whiteouts {
    fn drop(&mut self) {
        self.cleanup();
    }
}
