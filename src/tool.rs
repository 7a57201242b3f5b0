//! The external archivers strata drives.
//!
//! There is no library for reading or writing squashfs, so every pack
//! and extract ends up as one of three binaries. This module is the one
//! table describing them: what each is called, whether layer builds can
//! limp along without it, and what to tell the user when it is missing.
//! Tools are located with an explicit PATH search and spawned without a
//! shell, so the search has to handle absolute, relative, and bare names
//! itself.

use anyhow::{bail, Context, Result};
use nix::unistd::{access, AccessFlags};
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

/// External tools the layer builder shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Packs a rootfs into a squashfs image.
    Mksquashfs,
    /// Extracts squashfs images for union-mount backends.
    Unsquashfs,
    /// Extracts squashfs with whiteouts, devices, and owners intact,
    /// which btrfs snapshots need.
    Squashtool,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Mksquashfs, Tool::Unsquashfs, Tool::Squashtool];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Mksquashfs => "mksquashfs",
            Tool::Unsquashfs => "unsquashfs",
            Tool::Squashtool => "squashtool",
        }
    }

    /// Whether layer builds are dead in the water without this tool.
    pub fn required(&self) -> bool {
        !matches!(self, Tool::Squashtool)
    }

    /// What to tell the user when the tool is missing.
    pub fn install_hint(&self) -> &'static str {
        match self {
            Tool::Mksquashfs | Tool::Unsquashfs => "install the squashfs-tools package",
            Tool::Squashtool => {
                "build it from https://github.com/anuvu/squashfs; \
                 only the btrfs storage backend needs it"
            }
        }
    }

    /// Locate the tool on PATH.
    pub fn locate(&self) -> Option<PathBuf> {
        which(self.name())
    }
}

/// Run a tool to completion with captured output.
///
/// `action` says what the invocation was for; a non-zero exit renders as
/// `<action> (<tool> exited N)` with the tool's stderr attached, and a
/// tool absent from PATH fails with its install hint instead.
pub fn run_tool<I, S>(tool: Tool, action: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let Some(program) = tool.locate() else {
        bail!(
            "{}: {} not found on PATH; {}",
            action,
            tool.name(),
            tool.install_hint()
        );
    };

    let output = Command::new(&program)
        .args(args)
        .output()
        .with_context(|| format!("{}: couldn't spawn {}", action, tool.name()))?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            bail!("{} ({} exited {})", action, tool.name(), code);
        }
        bail!("{} ({} exited {}):\n{}", action, tool.name(), code, stderr);
    }

    Ok(())
}

/// Locate a program the way execvp would, without involving a shell.
pub fn which(program: &str) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = env::var_os("PATH")
        .map(|p| env::split_paths(&p).collect())
        .unwrap_or_default();
    which_search(program, &dirs)
}

/// PATH search over an explicit directory list.
///
/// Names containing a '/' are not searched: an absolute name is checked
/// as-is, a relative one against the current directory.
pub fn which_search(program: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if program.contains('/') {
        if Path::new(program).is_absolute() {
            vec![PathBuf::from(program)]
        } else {
            vec![Path::new(".").join(program)]
        }
    } else {
        dirs.iter().map(|d| d.join(program)).collect()
    };

    candidates.into_iter().find(|c| is_executable(c))
}

fn is_executable(path: &Path) -> bool {
    access(path, AccessFlags::X_OK).is_ok()
}
