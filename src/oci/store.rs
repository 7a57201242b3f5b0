//! Disk-based OCI content store.
//!
//! Operates on a standard OCI image layout: an `oci-layout` marker file,
//! `index.json` mapping tag annotations to manifest descriptors, and
//! content-addressed blobs under `blobs/<algorithm>/<hex>`.

use anyhow::{bail, Context, Result};
use oci_spec::image::{
    Arch, Descriptor, DescriptorBuilder, History, HistoryBuilder, ImageConfiguration,
    ImageConfigurationBuilder, ImageIndex, ImageIndexBuilder, ImageManifest,
    ImageManifestBuilder, MediaType, Os, RootFsBuilder, SCHEMA_VERSION,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};

use super::{MEDIA_TYPE_LAYER_SQUASHFS, REF_NAME_ANNOTATION};

/// Handle on an OCI image layout directory.
pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    /// Open a layout directory, creating the skeleton if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir.join("blobs/sha256"))
            .with_context(|| format!("couldn't create OCI layout at {}", dir.display()))?;

        let layout = dir.join("oci-layout");
        if !layout.exists() {
            fs::write(&layout, "{\"imageLayoutVersion\": \"1.0.0\"}\n")
                .context("couldn't write oci-layout")?;
        }

        let index_path = dir.join("index.json");
        if !index_path.exists() {
            let index = ImageIndexBuilder::default()
                .schema_version(SCHEMA_VERSION)
                .media_type(MediaType::ImageIndex)
                .manifests(Vec::new())
                .build()
                .context("couldn't build empty image index")?;
            index
                .to_file_pretty(&index_path)
                .context("couldn't write index.json")?;
        }

        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Path of a blob by its `<algorithm>:<hex>` digest.
    pub fn blob_path(&self, digest: &str) -> PathBuf {
        let (algorithm, hex) = digest.split_once(':').unwrap_or(("sha256", digest));
        self.dir.join("blobs").join(algorithm).join(hex)
    }

    /// Stream a squashfs layer blob into the store without compressing it,
    /// and append it to tag `name`'s image (manifest, config diff_ids, and
    /// a history entry crediting `author`). Returns the layer descriptor.
    pub fn add_blob_no_compression(
        &self,
        name: &str,
        author: &str,
        reader: &mut impl Read,
    ) -> Result<Descriptor> {
        let blobs_dir = self.dir.join("blobs/sha256");
        let mut staged = tempfile::NamedTempFile::new_in(&blobs_dir)
            .context("couldn't stage blob")?;

        let mut hasher = Sha256::new();
        let mut size: i64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf).context("couldn't read blob")?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            staged
                .write_all(&buf[..n])
                .context("couldn't write blob")?;
            size += n as i64;
        }

        let digest = format!("sha256:{:x}", hasher.finalize());
        let target = self.blob_path(&digest);
        if !target.exists() {
            staged
                .persist(&target)
                .with_context(|| format!("couldn't persist blob {}", digest))?;
        }

        let descriptor = DescriptorBuilder::default()
            .media_type(MediaType::Other(MEDIA_TYPE_LAYER_SQUASHFS.to_string()))
            .digest(digest.clone())
            .size(size)
            .build()
            .context("couldn't build layer descriptor")?;

        self.append_layer(name, author, &descriptor)
            .with_context(|| format!("couldn't update image manifest for {}", name))?;

        Ok(descriptor)
    }

    /// Resolve a tag to its manifest descriptor and parsed manifest.
    pub fn lookup(&self, name: &str) -> Result<(Descriptor, ImageManifest)> {
        let index = self.read_index()?;
        let descriptor = index
            .manifests()
            .iter()
            .find(|d| ref_name(d) == Some(name))
            .cloned();
        let Some(descriptor) = descriptor else {
            bail!("no image named {} in {}", name, self.dir.display());
        };
        let manifest = self.read_json_blob(descriptor.digest())?;
        Ok((descriptor, manifest))
    }

    fn read_index(&self) -> Result<ImageIndex> {
        let path = self.dir.join("index.json");
        ImageIndex::from_file(&path)
            .with_context(|| format!("couldn't read {}", path.display()))
    }

    fn read_json_blob<T: DeserializeOwned>(&self, digest: &str) -> Result<T> {
        let path = self.blob_path(digest);
        let file =
            File::open(&path).with_context(|| format!("couldn't open blob {}", digest))?;
        serde_json::from_reader(file).with_context(|| format!("couldn't parse blob {}", digest))
    }

    fn write_json_blob<T: Serialize>(
        &self,
        value: &T,
        media_type: MediaType,
        annotations: Option<HashMap<String, String>>,
    ) -> Result<Descriptor> {
        let data = serde_json::to_vec(value).context("couldn't serialize blob")?;
        let digest = format!("sha256:{:x}", Sha256::digest(&data));
        let path = self.blob_path(&digest);
        if !path.exists() {
            fs::write(&path, &data).with_context(|| format!("couldn't write blob {}", digest))?;
        }

        let mut builder = DescriptorBuilder::default()
            .media_type(media_type)
            .digest(digest)
            .size(data.len() as i64);
        if let Some(annotations) = annotations {
            builder = builder.annotations(annotations);
        }
        builder.build().context("couldn't build blob descriptor")
    }

    /// Append a layer to tag `name`, creating the image if it is new, and
    /// repoint the index entry at the rewritten manifest.
    fn append_layer(&self, name: &str, author: &str, layer: &Descriptor) -> Result<()> {
        let index = self.read_index()?;
        let existing = index
            .manifests()
            .iter()
            .find(|d| ref_name(d) == Some(name))
            .cloned();

        let (mut layers, mut diff_ids, mut history, arch, os) = match &existing {
            Some(descriptor) => {
                let manifest: ImageManifest = self.read_json_blob(descriptor.digest())?;
                let config: ImageConfiguration =
                    self.read_json_blob(manifest.config().digest())?;
                (
                    manifest.layers().clone(),
                    config.rootfs().diff_ids().clone(),
                    config.history().clone(),
                    config.architecture().clone(),
                    config.os().clone(),
                )
            }
            None => (
                Vec::new(),
                Vec::new(),
                Vec::<History>::new(),
                Arch::Amd64,
                Os::Linux,
            ),
        };

        let now = chrono::Utc::now().to_rfc3339();

        layers.push(layer.clone());
        // squashfs layers are stored uncompressed, so the diff ID is the
        // blob digest itself
        diff_ids.push(layer.digest().clone());
        history.push(
            HistoryBuilder::default()
                .created(now.clone())
                .created_by(format!("strata layer {}", name))
                .author(author.to_string())
                .build()
                .context("couldn't build history entry")?,
        );

        let rootfs = RootFsBuilder::default()
            .typ("layers".to_string())
            .diff_ids(diff_ids)
            .build()
            .context("couldn't build rootfs record")?;
        let config = ImageConfigurationBuilder::default()
            .created(now)
            .author(author.to_string())
            .architecture(arch)
            .os(os)
            .rootfs(rootfs)
            .history(history)
            .build()
            .context("couldn't build image config")?;

        let config_descriptor = self.write_json_blob(&config, MediaType::ImageConfig, None)?;
        let manifest = ImageManifestBuilder::default()
            .schema_version(SCHEMA_VERSION)
            .media_type(MediaType::ImageManifest)
            .config(config_descriptor)
            .layers(layers)
            .build()
            .context("couldn't build image manifest")?;

        let mut annotations = HashMap::new();
        annotations.insert(REF_NAME_ANNOTATION.to_string(), name.to_string());
        let manifest_descriptor =
            self.write_json_blob(&manifest, MediaType::ImageManifest, Some(annotations))?;

        let manifests: Vec<Descriptor> = index
            .manifests()
            .iter()
            .filter(|d| ref_name(d) != Some(name))
            .cloned()
            .chain(std::iter::once(manifest_descriptor))
            .collect();
        let index = ImageIndexBuilder::default()
            .schema_version(SCHEMA_VERSION)
            .media_type(MediaType::ImageIndex)
            .manifests(manifests)
            .build()
            .context("couldn't build image index")?;
        index
            .to_file_pretty(self.dir.join("index.json"))
            .context("couldn't write index.json")?;

        Ok(())
    }
}

fn ref_name(descriptor: &Descriptor) -> Option<&str> {
    descriptor
        .annotations()
        .as_ref()
        .and_then(|a| a.get(REF_NAME_ANNOTATION))
        .map(|s| s.as_str())
}
