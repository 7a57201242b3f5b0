//! Incremental layer generation.
//!
//! Compares a bundle's rootfs against the manifest recorded when it was
//! unpacked (or last layered), and turns the difference into one squashfs
//! layer in the content store. An unchanged rootfs produces nothing.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::bundle::{self, BundleMeta, DescriptorChain, ROOTFS_DIR};
use crate::manifest::diff::{self, DiffKind};
use crate::manifest::{walk_rootfs, FsEval, Manifest};
use crate::oci::ContentStore;
use crate::squashfs::whiteout::{Marker, Whiteouts};
use crate::squashfs::{make_squashfs, ExcludePaths};

/// Generate one squashfs layer for the changes in `bundle_path`'s rootfs.
///
/// On success the bundle's `from` chain points at the new layer blob and
/// its manifest has been regenerated under the new digest's filename.
/// When the filtered diff is empty, the store, meta, and manifest are all
/// left untouched.
pub fn generate_squashfs_layer(
    name: &str,
    author: &str,
    bundle_path: &Path,
    oci_dir: &Path,
    store: &ContentStore,
) -> Result<()> {
    let mut meta = BundleMeta::read(bundle_path)?;
    let Some(from) = meta.from.descriptor() else {
        bail!("bundle {} has an empty descriptor chain", bundle_path.display());
    };

    let prior_path = bundle_path.join(bundle::manifest_name(from.digest()));
    let prior_text = fs::read_to_string(&prior_path)
        .with_context(|| format!("couldn't open manifest {}", prior_path.display()))?;
    let prior = Manifest::parse(&prior_text)
        .with_context(|| format!("couldn't parse manifest {}", prior_path.display()))?;

    let rootfs_path = bundle_path.join(ROOTFS_DIR);
    let current = walk_rootfs(&rootfs_path, FsEval::Rootless)
        .with_context(|| format!("couldn't walk {}", rootfs_path.display()))?;

    let diffs = diff::simplify(diff::filter_ignore_root(diff::compare(&prior, &current)));

    let mut needs_layer = false;
    let mut paths = ExcludePaths::new();
    let mut whiteouts = Whiteouts::new();

    for entry in &diffs {
        let host = rootfs_path.join(&entry.path);
        match &entry.kind {
            DiffKind::Modified { new, .. } | DiffKind::Extra { new } => {
                needs_layer = true;
                paths.add_include(&host, new.is_dir());
            }
            DiffKind::Missing { old } => {
                needs_layer = true;
                paths.add_include(&host, old.is_dir());
                if let Marker::Sidecar(sidecar) = whiteouts.place(&host)? {
                    paths.add_include(&sidecar, false);
                }
            }
            DiffKind::Same { .. } => paths.add_exclude(&host),
        }
    }

    if !needs_layer {
        println!("No filesystem changes for {}; layer not needed", name);
        return Ok(());
    }

    let mut blob = make_squashfs(oci_dir, &rootfs_path, Some(&paths))?;

    let descriptor = store
        .add_blob_no_compression(name, author, &mut blob)
        .context("couldn't add squashfs blob")?;
    drop(blob);

    // The new manifest must be on disk before the old one goes away, so a
    // crash in between leaves the bundle with at least one valid snapshot.
    let new_name = bundle::manifest_name(descriptor.digest());
    bundle::write_bundle_manifest(&new_name, bundle_path, FsEval::Rootless)?;
    if prior_path != bundle_path.join(&new_name) {
        let _ = fs::remove_file(&prior_path);
    }

    meta.from = DescriptorChain {
        walk: vec![descriptor.clone()],
    };
    meta.write(bundle_path)?;

    whiteouts.cleanup();

    println!(
        "Added layer {} for {} ({} bytes)",
        descriptor.digest(),
        name,
        descriptor.size()
    );
    Ok(())
}
