use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use strata::oci::ContentStore;
use strata::squashfs::{extract_single_squash, generate_squashfs_layer, StorageBackend};
use strata::{preflight, unpack};

#[derive(Parser)]
#[command(name = "strata", about = "Incremental squashfs layer builder for OCI images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a bundle's filesystem changes into a squashfs layer
    Layer {
        /// Bundle directory (rootfs + metadata)
        #[arg(long)]
        bundle: PathBuf,
        /// OCI layout directory receiving the layer blob
        #[arg(long)]
        oci: PathBuf,
        /// Image tag to append the layer to
        #[arg(long)]
        name: String,
        /// Author recorded in the image history
        #[arg(long, default_value = "")]
        author: String,
    },
    /// Unpack a tagged image into a fresh bundle
    Unpack {
        /// OCI layout directory holding the image
        #[arg(long)]
        oci: PathBuf,
        /// Image tag to unpack
        #[arg(long)]
        name: String,
        /// Bundle directory to create
        #[arg(long)]
        bundle: PathBuf,
        /// Storage backend the bundle will live on
        #[arg(long, value_enum, default_value_t = StorageBackend::Overlay)]
        backend: StorageBackend,
    },
    /// Extract a single squashfs blob into a directory
    Extract {
        /// Squashfs file to extract
        file: PathBuf,
        /// Destination directory
        dir: PathBuf,
        /// Storage backend the extracted tree will live on
        #[arg(long, value_enum, default_value_t = StorageBackend::Overlay)]
        backend: StorageBackend,
    },
    /// Check that required external tools are installed
    Preflight,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Layer {
            bundle,
            oci,
            name,
            author,
        } => {
            let store = ContentStore::open(&oci)?;
            generate_squashfs_layer(&name, &author, &bundle, &oci, &store)?;
        }
        Commands::Unpack {
            oci,
            name,
            bundle,
            backend,
        } => {
            unpack::unpack_bundle(&oci, &name, &bundle, backend)?;
        }
        Commands::Extract { file, dir, backend } => {
            extract_single_squash(&file, &dir, backend)?;
        }
        Commands::Preflight => {
            let report = preflight::check_tools();
            report.print();
            if !report.missing_required().is_empty() {
                bail!("preflight failed");
            }
        }
    }

    Ok(())
}
