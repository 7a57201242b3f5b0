//! OCI image-layout plumbing.

pub mod store;

pub use store::ContentStore;

/// Media type of an uncompressed squashfs layer blob.
///
/// squashfs is internally compressed; wrapping it in gzip would burn CPU
/// and break block-level dedup, so layers are stored as-is.
pub const MEDIA_TYPE_LAYER_SQUASHFS: &str = "application/vnd.oci.image.layer.squashfs";

/// Index annotation that names a tagged image.
pub const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";
