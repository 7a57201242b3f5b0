//! Shared test utilities for strata tests.

use oci_spec::image::{Descriptor, DescriptorBuilder, MediaType};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use strata::bundle::{self, BundleMeta};
use strata::manifest::FsEval;

/// Test environment with a bundle and an OCI layout under one temp dir.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Bundle directory (meta + manifest + rootfs)
    pub bundle: PathBuf,
    /// The bundle's rootfs
    pub rootfs: PathBuf,
    /// OCI layout directory
    pub oci: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with an empty rootfs.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let bundle = base.join("bundle");
        let rootfs = bundle.join("rootfs");
        let oci = base.join("oci");

        fs::create_dir_all(&rootfs).expect("Failed to create rootfs dir");
        fs::create_dir_all(&oci).expect("Failed to create oci dir");

        Self {
            _temp_dir: temp_dir,
            bundle,
            rootfs,
            oci,
        }
    }

    /// Record the current rootfs as the bundle's baseline: writes the
    /// manifest under the seed descriptor's digest plus the bundle meta.
    /// Returns the path of the manifest file.
    pub fn record_baseline(&self) -> PathBuf {
        let descriptor = seed_descriptor();
        let name = bundle::manifest_name(descriptor.digest());
        bundle::write_bundle_manifest(&name, &self.bundle, FsEval::Rootless)
            .expect("Failed to write baseline manifest");
        BundleMeta::new(descriptor)
            .write(&self.bundle)
            .expect("Failed to write bundle meta");
        self.bundle.join(name)
    }

    /// Count regular files under the OCI layout's blob directory.
    pub fn blob_count(&self) -> usize {
        let blobs = self.oci.join("blobs/sha256");
        if !blobs.exists() {
            return 0;
        }
        fs::read_dir(&blobs)
            .expect("Failed to read blobs dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .count()
    }
}

/// Descriptor standing in for the image the bundle was unpacked from.
pub fn seed_descriptor() -> Descriptor {
    DescriptorBuilder::default()
        .media_type(MediaType::ImageManifest)
        .digest(format!("sha256:{}", "ab".repeat(32)))
        .size(0i64)
        .build()
        .expect("Failed to build seed descriptor")
}

/// Populate a mock rootfs with a small but realistic tree.
pub fn seed_rootfs(rootfs: &Path) {
    for dir in ["etc", "usr/bin", "usr/share", "var/log"] {
        fs::create_dir_all(rootfs.join(dir)).expect("Failed to create rootfs dir");
    }
    fs::write(rootfs.join("etc/hosts"), "127.0.0.1 localhost\n").unwrap();
    fs::write(rootfs.join("etc/os-release"), "NAME=test\n").unwrap();
    fs::write(rootfs.join("usr/bin/ls"), "ls-binary-v1").unwrap();
    fs::write(rootfs.join("usr/bin/env"), "env-binary").unwrap();
    fs::write(rootfs.join("usr/share/doc"), "docs").unwrap();
}

/// True when the squashfs tools needed by generation tests are present.
pub fn have_squashfs_tools() -> bool {
    strata::tool::Tool::Mksquashfs.locate().is_some()
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}
