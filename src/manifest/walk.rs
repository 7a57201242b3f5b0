//! Rootfs walk - builds a manifest from the live filesystem.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, ErrorKind};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;
use walkdir::WalkDir;

use super::{Entry, EntryKind, Manifest};

/// How the walk behaves when it lacks privilege.
///
/// `Rootless` records an entry without its content hash when the file
/// cannot be opened for reading; `Privileged` treats that as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEval {
    Rootless,
    Privileged,
}

/// Walk a rootfs and record every entry, the root itself included (as `.`).
///
/// Symlinks are never followed. Entry order is deterministic.
pub fn walk_rootfs(rootfs: &Path, fs_eval: FsEval) -> Result<Manifest> {
    let mut manifest = Manifest::default();

    for dirent in WalkDir::new(rootfs).follow_links(false).sort_by_file_name() {
        let dirent =
            dirent.with_context(|| format!("couldn't walk {}", rootfs.display()))?;
        let path = dirent.path();

        let rel = path
            .strip_prefix(rootfs)
            .with_context(|| format!("path {} escapes rootfs", path.display()))?;
        let rel = if rel.as_os_str().is_empty() {
            ".".to_string()
        } else {
            rel.to_string_lossy().into_owned()
        };

        let meta = dirent
            .metadata()
            .with_context(|| format!("couldn't stat {}", path.display()))?;
        let ft = meta.file_type();

        let kind = if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Dir
        } else if ft.is_file() {
            EntryKind::File
        } else if ft.is_char_device() {
            EntryKind::CharDevice
        } else if ft.is_block_device() {
            EntryKind::BlockDevice
        } else if ft.is_fifo() {
            EntryKind::Fifo
        } else {
            EntryKind::Socket
        };

        let link = if kind == EntryKind::Symlink {
            let target = std::fs::read_link(path)
                .with_context(|| format!("couldn't read link {}", path.display()))?;
            Some(target.to_string_lossy().into_owned())
        } else {
            None
        };

        let device = match kind {
            EntryKind::CharDevice | EntryKind::BlockDevice => {
                let rdev = meta.rdev();
                Some((nix::sys::stat::major(rdev), nix::sys::stat::minor(rdev)))
            }
            _ => None,
        };

        let (size, sha256) = if kind == EntryKind::File {
            (Some(meta.len()), hash_file(path, fs_eval)?)
        } else {
            (None, None)
        };

        manifest.entries.insert(
            rel,
            Entry {
                kind,
                uid: meta.uid(),
                gid: meta.gid(),
                mode: meta.mode() & 0o7777,
                size,
                sha256,
                link,
                device,
            },
        );
    }

    Ok(manifest)
}

fn hash_file(path: &Path, fs_eval: FsEval) -> Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::PermissionDenied && fs_eval == FsEval::Rootless => {
            return Ok(None);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("couldn't open {} for hashing", path.display()));
        }
    };

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("couldn't hash {}", path.display()))?;
    Ok(Some(format!("{:x}", hasher.finalize())))
}
