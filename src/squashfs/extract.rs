//! Squashfs extraction, storage-backend aware.

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use crate::tool::{run_tool, Tool};

/// Storage backend the extracted layer will live on.
///
/// btrfs snapshots materialize every layer as real files, so extraction
/// must reproduce whiteouts, device nodes, sockets, and ownership
/// exactly; union backends only need the file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    Btrfs,
    /// Overlay, tmpfs, and anything else union-mounted.
    Overlay,
}

/// Extract one squashfs blob into `extract_dir`.
///
/// The btrfs path requires squashtool; checked before the directory is
/// created so a missing tool leaves no trace on disk.
pub fn extract_single_squash(
    squash_file: &Path,
    extract_dir: &Path,
    backend: StorageBackend,
) -> Result<()> {
    match backend {
        StorageBackend::Btrfs => {
            if Tool::Squashtool.locate().is_none() {
                bail!(
                    "must have squashtool (https://github.com/anuvu/squashfs) to correctly \
                     extract squashfs using the btrfs storage backend"
                );
            }
            fs::create_dir_all(extract_dir)?;

            let args: Vec<&OsStr> = vec![
                OsStr::new("extract"),
                OsStr::new("--whiteouts"),
                OsStr::new("--perms"),
                OsStr::new("--devs"),
                OsStr::new("--sockets"),
                OsStr::new("--owners"),
                squash_file.as_os_str(),
                extract_dir.as_os_str(),
            ];
            run_tool(Tool::Squashtool, "couldn't extract squashfs", args)?;
        }
        StorageBackend::Overlay => {
            fs::create_dir_all(extract_dir)?;

            let args: Vec<&OsStr> = vec![
                OsStr::new("-f"),
                OsStr::new("-d"),
                extract_dir.as_os_str(),
                squash_file.as_os_str(),
            ];
            run_tool(Tool::Unsquashfs, "couldn't extract squashfs", args)?;
        }
    }

    Ok(())
}
