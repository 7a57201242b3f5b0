//! Bundle unpacking - the producer of the state `layer` consumes.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::bundle::{self, BundleMeta, ROOTFS_DIR};
use crate::manifest::FsEval;
use crate::oci::ContentStore;
use crate::squashfs::{extract_single_squash, StorageBackend};

/// Unpack a tagged image into a fresh bundle directory.
///
/// Layers are extracted bottom-up into `<bundle>/rootfs`, then the
/// baseline manifest and the bundle meta are written, keyed on the
/// image's manifest descriptor.
pub fn unpack_bundle(
    oci_dir: &Path,
    name: &str,
    bundle_path: &Path,
    backend: StorageBackend,
) -> Result<()> {
    let store = ContentStore::open(oci_dir)?;
    let (manifest_descriptor, manifest) = store.lookup(name)?;

    let rootfs = bundle_path.join(ROOTFS_DIR);
    if rootfs.exists() {
        bail!("bundle rootfs {} already exists", rootfs.display());
    }
    fs::create_dir_all(&rootfs)
        .with_context(|| format!("couldn't create {}", rootfs.display()))?;

    for layer in manifest.layers() {
        println!("Extracting layer {}...", layer.digest());
        let blob = store.blob_path(layer.digest());
        extract_single_squash(&blob, &rootfs, backend)
            .with_context(|| format!("couldn't extract layer {}", layer.digest()))?;
    }

    let mtree_name = bundle::manifest_name(manifest_descriptor.digest());
    bundle::write_bundle_manifest(&mtree_name, bundle_path, FsEval::Rootless)?;

    BundleMeta::new(manifest_descriptor).write(bundle_path)?;

    println!("Unpacked {} into {}", name, bundle_path.display());
    Ok(())
}
