//! Squashfs packing using mksquashfs.

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::squashfs::ExcludePaths;
use crate::tool::{run_tool, Tool};

/// Unlinks a path when dropped; errors are irrelevant by then.
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

/// Pack `rootfs` into a squashfs blob, omitting the excluded paths.
///
/// Both the exclusion list and the image are temp files in `tempdir`.
/// The returned handle is the only reference to the blob: its directory
/// entry is already unlinked, so closing the handle releases the disk
/// space. Callers must read it fully before dropping it.
pub fn make_squashfs(
    tempdir: &Path,
    rootfs: &Path,
    excludes: Option<&ExcludePaths>,
) -> Result<File> {
    let mut excludes_file = None;
    if let Some(paths) = excludes {
        if !paths.is_empty() {
            let mut file = tempfile::Builder::new()
                .prefix("strata-squashfs-exclude-")
                .tempfile_in(tempdir)
                .context("couldn't create exclude path list")?;
            file.write_all(paths.render().as_bytes())
                .context("couldn't write exclude path list")?;
            file.flush().context("couldn't write exclude path list")?;
            excludes_file = Some(file);
        }
    }

    // mksquashfs refuses to overwrite, so reserve a name and free it again
    let output = tempfile::Builder::new()
        .prefix("strata-squashfs-img-")
        .tempfile_in(tempdir)
        .context("couldn't create squashfs temp file")?;
    let output_path = output.path().to_path_buf();
    output
        .close()
        .context("couldn't unlink squashfs temp file")?;
    let _output_guard = RemoveOnDrop(output_path.clone());

    let mut args: Vec<&OsStr> = vec![rootfs.as_os_str(), output_path.as_os_str()];
    if let Some(file) = &excludes_file {
        args.push(OsStr::new("-ef"));
        args.push(file.path().as_os_str());
    }
    run_tool(Tool::Mksquashfs, "couldn't build squashfs", args)?;

    // Open, then let the guard unlink; the handle keeps the blob readable
    File::open(&output_path)
        .with_context(|| format!("couldn't open squashfs {}", output_path.display()))
}
