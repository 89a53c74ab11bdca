//! Asset partitioning
//!
//! Splits an oversized model file into bounded-size parts plus a
//! manifest at packaging time. Packaging pipelines on several platforms
//! enforce hard per-file ceilings (2 GiB pak entries, mobile package
//! limits), so multi-gigabyte weights must ship as parts and be rejoined
//! on the target device.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::checksum::Crc32;
use crate::manifest::{
    part_relative_path, LayoutMode, Manifest, ManifestError, PartRecord, MANIFEST_VERSION,
};

/// Default maximum part size (500 MiB), sized to stay well under a
/// 2 GiB per-file platform ceiling with margin.
pub const DEFAULT_CHUNK_SIZE: u64 = 500 * 1024 * 1024;

/// Copy buffer for streaming reads and writes (1 MiB).
const COPY_BUF_LEN: usize = 1024 * 1024;

/// Errors that can occur while partitioning an asset
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Cannot read source file {}: {}", .path.display(), .source)]
    SourceUnavailable {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Cannot write to output location {}: {}", .path.display(), .source)]
    OutputUnavailable {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Invalid chunk size: {0} (must be greater than zero)")]
    InvalidConfiguration(u64),

    #[error(transparent)]
    Manifest(ManifestError),
}

/// Split `source_path` into parts of at most `chunk_size` bytes under
/// `output_dir`, and write the manifest describing them.
///
/// Parts are written in index order starting at 1; per-part and
/// whole-asset checksums are accumulated while streaming, so peak memory
/// stays bounded by the copy buffer regardless of asset size. The
/// manifest is written last, after every part has been synced: if a
/// manifest exists, the part set it describes is complete.
///
/// Re-running with identical inputs reproduces byte-identical parts and
/// an identical manifest.
pub fn partition(
    source_path: &Path,
    output_dir: &Path,
    chunk_size: u64,
    layout: LayoutMode,
) -> Result<Manifest, PartitionError> {
    if chunk_size == 0 {
        return Err(PartitionError::InvalidConfiguration(chunk_size));
    }

    let source_err = |e: io::Error| PartitionError::SourceUnavailable {
        path: source_path.to_path_buf(),
        source: e,
    };

    let source = File::open(source_path).map_err(source_err)?;
    let total_size = source.metadata().map_err(source_err)?.len();
    let file_name = source_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| PartitionError::SourceUnavailable {
            path: source_path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "source path has no file name"),
        })?;

    fs::create_dir_all(output_dir).map_err(|e| PartitionError::OutputUnavailable {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    let part_count = total_size.div_ceil(chunk_size) as u32;
    tracing::info!(
        "Partitioning {} ({} bytes) into {} part(s) of at most {} bytes",
        file_name,
        total_size,
        part_count,
        chunk_size
    );

    let mut reader = BufReader::new(source);
    let mut asset_hasher = Crc32::new();
    let mut parts = Vec::with_capacity(part_count as usize);
    let mut buf = vec![0u8; COPY_BUF_LEN];
    let mut remaining = total_size;

    for index in 1..=part_count {
        let part_len = remaining.min(chunk_size);
        let relative = part_relative_path(&file_name, layout, index);
        let part_path = output_dir.join(&relative);

        if let Some(parent) = part_path.parent() {
            fs::create_dir_all(parent).map_err(|e| PartitionError::OutputUnavailable {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let output_err = |e: io::Error| PartitionError::OutputUnavailable {
            path: part_path.clone(),
            source: e,
        };

        let part_file = File::create(&part_path).map_err(output_err)?;
        let mut writer = BufWriter::new(part_file);
        let mut part_hasher = Crc32::new();

        let mut left = part_len;
        while left > 0 {
            let want = left.min(COPY_BUF_LEN as u64) as usize;
            reader.read_exact(&mut buf[..want]).map_err(source_err)?;
            writer.write_all(&buf[..want]).map_err(output_err)?;
            part_hasher.update(&buf[..want]);
            asset_hasher.update(&buf[..want]);
            left -= want as u64;
        }

        // Every part must be durable before the manifest claims it exists
        writer.flush().map_err(output_err)?;
        writer.get_ref().sync_all().map_err(output_err)?;

        tracing::debug!(
            "Wrote part {}/{}: {} ({} bytes)",
            index,
            part_count,
            relative.display(),
            part_len
        );

        parts.push(PartRecord {
            index,
            length: part_len,
            crc32: part_hasher.finalize(),
        });
        remaining -= part_len;
    }

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        file_name: file_name.clone(),
        total_size,
        chunk_size,
        layout,
        parts,
        asset_crc32: asset_hasher.finalize(),
    };
    manifest.validate().map_err(PartitionError::Manifest)?;

    let manifest_path = output_dir.join(Manifest::manifest_file_name(&file_name));
    manifest.save(&manifest_path).map_err(|e| match e {
        ManifestError::IoError(source) => PartitionError::OutputUnavailable {
            path: manifest_path.clone(),
            source,
        },
        other => PartitionError::Manifest(other),
    })?;

    tracing::info!("Partitioned {} into {} part(s)", file_name, part_count);

    Ok(manifest)
}
