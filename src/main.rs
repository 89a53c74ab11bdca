//! ModelPart - Model Asset Splitter
//!
//! Command-line tool for splitting oversized model files into
//! package-safe parts at packaging time and rejoining them afterwards.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use modelpart::format_size;
use modelpart::manifest::{scan_manifests, LayoutMode};
use modelpart::partition::{partition, DEFAULT_CHUNK_SIZE};
use modelpart::reassemble::{reassemble, reassemble_into_dir};

/// ModelPart — split oversized model files for packaging and rejoin them.
#[derive(Parser)]
#[command(name = "modelpart", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a model file into bounded-size parts plus a manifest.
    Split {
        /// Path to the source model file.
        source: PathBuf,

        /// Directory receiving the parts and the manifest.
        out_dir: PathBuf,

        /// Maximum part size in bytes.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,

        /// Place each part in its own `<name>-part<N>` subdirectory.
        #[arg(long)]
        foldered: bool,
    },

    /// Verify parts against a manifest and reconstruct the original file.
    Join {
        /// Path to the manifest file.
        manifest: PathBuf,

        /// Directory containing the parts.
        parts_dir: PathBuf,

        /// Destination path for the reconstructed file. Defaults to the
        /// original file name next to the parts directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List partitioned assets described by manifests in a directory.
    List {
        /// Directory to scan for manifests.
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("modelpart=info".parse()?))
        .init();

    info!("Starting ModelPart v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    match cli.command {
        Command::Split {
            source,
            out_dir,
            chunk_size,
            foldered,
        } => {
            let layout = if foldered {
                LayoutMode::Foldered
            } else {
                LayoutMode::Flat
            };
            let manifest = partition(&source, &out_dir, chunk_size, layout)
                .with_context(|| format!("Failed to split {}", source.display()))?;

            println!(
                "Split {} ({}) into {} part(s) under {}",
                manifest.file_name,
                format_size(manifest.total_size),
                manifest.part_count(),
                out_dir.display()
            );
        }

        Command::Join {
            manifest,
            parts_dir,
            out,
        } => {
            let path = match out {
                Some(out) => reassemble(&manifest, &parts_dir, &out),
                None => {
                    let dest_dir = parts_dir
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| parts_dir.clone());
                    reassemble_into_dir(&manifest, &parts_dir, &dest_dir)
                }
            }
            .with_context(|| format!("Failed to join {}", manifest.display()))?;

            println!("Reassembled {}", path.display());
        }

        Command::List { dir } => {
            let manifests = scan_manifests(&dir)?;

            if manifests.is_empty() {
                println!("No partitioned assets found in {}", dir.display());
            }
            for manifest in manifests {
                println!(
                    "{}  {}  {} part(s)  {:?} layout",
                    manifest.file_name,
                    format_size(manifest.total_size),
                    manifest.part_count(),
                    manifest.layout
                );
            }
        }
    }

    Ok(())
}
