//! Bundle metadata - where a rootfs came from and what it looked like.
//!
//! A bundle is a directory holding `rootfs/` plus two records: a JSON
//! meta file with the descriptor chain the rootfs was unpacked from, and
//! a filesystem manifest snapshot named after the digest of the newest
//! descriptor in that chain.

use anyhow::{Context, Result};
use oci_spec::image::Descriptor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::manifest::{walk_rootfs, FsEval};

/// Name of the rootfs directory inside a bundle.
pub const ROOTFS_DIR: &str = "rootfs";

const META_NAME: &str = "strata.json";
const META_VERSION: u32 = 1;

/// Ordered descriptors from the image index down to the blob the bundle
/// was produced from. The last element is the effective source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorChain {
    pub walk: Vec<Descriptor>,
}

impl DescriptorChain {
    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.walk.last()
    }
}

/// On-disk record at `<bundle>/strata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMeta {
    pub version: u32,
    pub from: DescriptorChain,
}

impl BundleMeta {
    pub fn new(from: Descriptor) -> Self {
        Self {
            version: META_VERSION,
            from: DescriptorChain { walk: vec![from] },
        }
    }

    pub fn read(bundle_path: &Path) -> Result<Self> {
        let path = bundle_path.join(META_NAME);
        let file = fs::File::open(&path)
            .with_context(|| format!("couldn't read bundle metadata {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("couldn't parse bundle metadata {}", path.display()))
    }

    pub fn write(&self, bundle_path: &Path) -> Result<()> {
        let path = bundle_path.join(META_NAME);
        let data = serde_json::to_vec_pretty(self).context("couldn't serialize bundle metadata")?;
        fs::write(&path, data)
            .with_context(|| format!("couldn't write bundle metadata {}", path.display()))
    }
}

/// Manifest filename for a source descriptor digest:
/// `sha256:abcd...` becomes `sha256_abcd....mtree`.
pub fn manifest_name(digest: &str) -> String {
    format!("{}.mtree", digest.replacen(':', "_", 1))
}

/// Snapshot `<bundle>/rootfs` into `<bundle>/<filename>`.
pub fn write_bundle_manifest(filename: &str, bundle_path: &Path, fs_eval: FsEval) -> Result<()> {
    let rootfs = bundle_path.join(ROOTFS_DIR);
    let manifest = walk_rootfs(&rootfs, fs_eval)
        .with_context(|| format!("couldn't walk {}", rootfs.display()))?;

    let path = bundle_path.join(filename);
    fs::write(&path, manifest.render())
        .with_context(|| format!("couldn't write manifest {}", path.display()))
}
