//! Squashfs layer machinery.
//!
//! Layers are squashfs images of the *changed* part of a bundle's rootfs.
//! There is no library for writing squashfs, so the builder drives the
//! mksquashfs binary; the trick is that mksquashfs accepts a file of paths
//! to exclude, so the diff walk accumulates an exclusion list instead of a
//! file list:
//!
//! ```text
//! bundle rootfs ──walk──┐
//!                       ├── diff ──┬── Same     -> exclude path
//! recorded manifest ────┘          ├── Extra    -> include path
//!                                  ├── Modified -> include path
//!                                  └── Missing  -> include + whiteout marker
//!
//! excludes file + rootfs ── mksquashfs ── blob ── content store ── descriptor
//! ```
//!
//! Deletions are encoded with overlay whiteouts (char dev 0/0) written into
//! the live rootfs for the duration of the pack, then removed.

pub mod exclude;
pub mod extract;
pub mod layer;
pub mod pack;
pub mod whiteout;

pub use exclude::ExcludePaths;
pub use extract::{extract_single_squash, StorageBackend};
pub use layer::generate_squashfs_layer;
pub use pack::make_squashfs;
