//! Asset reassembly
//!
//! Validates shipped parts against their manifest and reconstructs the
//! original file on the target device. Runs once per installation,
//! before the asset is handed to the model loader; a failed reassembly
//! must block the dependent feature rather than expose a partial file.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::checksum::{self, Crc32};
use crate::manifest::{Manifest, ManifestError};

/// Copy buffer for streaming reads and writes (1 MiB).
const COPY_BUF_LEN: usize = 1024 * 1024;

/// Errors that can occur while reassembling an asset
#[derive(Debug, Error)]
pub enum ReassemblyError {
    #[error("Manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Part {0} is missing or has the wrong length")]
    PartMissing(u32),

    #[error("Part {0} failed checksum verification")]
    PartCorrupt(u32),

    #[error("Reconstructed asset failed whole-file checksum verification")]
    AssetCorrupt,

    #[error("Insufficient storage while writing {}", .path.display())]
    InsufficientStorage { path: PathBuf },

    #[error("Failed to access data directory: {0}")]
    DataDirError(String),

    #[error("I/O failure during reassembly: {0}")]
    IoError(#[from] io::Error),
}

// One in-flight reconstruction per destination path. A second caller for
// the same destination blocks here, then observes the first caller's
// completed output through the reuse check.
static ASSET_LOCKS: Lazy<DashMap<PathBuf, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

fn lock_for(dest_path: &Path) -> Arc<Mutex<()>> {
    ASSET_LOCKS
        .entry(dest_path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Reassemble a partitioned asset into `dest_path`.
///
/// Every part is verified against the manifest (length, then checksum)
/// before a single destination byte is written, so a corrupt part is
/// reported with its precise index. Parts are then concatenated in index
/// order into a temporary file, the whole-asset checksum is verified,
/// and the file is renamed into place. Either the complete verified file
/// appears at `dest_path` or nothing does.
///
/// If `dest_path` already holds a byte-exact copy of the asset, it is
/// returned without rewriting, so re-invocation across app restarts does
/// not re-copy gigabytes of data.
pub fn reassemble(
    manifest_path: &Path,
    parts_dir: &Path,
    dest_path: &Path,
) -> Result<PathBuf, ReassemblyError> {
    if !manifest_path.is_file() {
        return Err(ReassemblyError::ManifestMissing(manifest_path.to_path_buf()));
    }
    let manifest = Manifest::load(manifest_path)?;

    let lock = lock_for(dest_path);
    let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    // Reuse a previously reconstructed file if it still verifies
    if dest_path.is_file() && checksum::file_crc32(dest_path)? == manifest.asset_crc32 {
        tracing::info!("Reusing verified asset at {}", dest_path.display());
        return Ok(dest_path.to_path_buf());
    }

    for part in &manifest.parts {
        verify_part(&manifest, parts_dir, part.index)?;
    }
    tracing::debug!(
        "Verified {} part(s) for {}",
        manifest.part_count(),
        manifest.file_name
    );

    concatenate(&manifest, parts_dir, dest_path)
}

/// Reassemble into `dest_dir`, deriving the destination file name from
/// the manifest's original file name.
pub fn reassemble_into_dir(
    manifest_path: &Path,
    parts_dir: &Path,
    dest_dir: &Path,
) -> Result<PathBuf, ReassemblyError> {
    if !manifest_path.is_file() {
        return Err(ReassemblyError::ManifestMissing(manifest_path.to_path_buf()));
    }
    let manifest = Manifest::load(manifest_path)?;
    let dest_path = dest_dir.join(&manifest.file_name);
    reassemble(manifest_path, parts_dir, &dest_path)
}

/// Platform-specific directory where reconstructed models are placed by
/// convention:
/// - Windows: `C:\Users\{user}\AppData\Roaming\ModelPart\ModelPart\models`
/// - macOS: `/Users/{user}/Library/Application Support/com.ModelPart.ModelPart/models`
/// - Linux: `/home/{user}/.local/share/modelpart/models`
pub fn default_restore_dir() -> Result<PathBuf, ReassemblyError> {
    directories::ProjectDirs::from("com", "ModelPart", "ModelPart")
        .map(|dirs| dirs.data_dir().join("models"))
        .ok_or_else(|| {
            ReassemblyError::DataDirError("Could not determine data directory".to_string())
        })
}

/// Check one part's length and checksum against its manifest record.
fn verify_part(
    manifest: &Manifest,
    parts_dir: &Path,
    index: u32,
) -> Result<(), ReassemblyError> {
    let record = &manifest.parts[index as usize - 1];
    let path = parts_dir.join(manifest.part_relative_path(index));

    let metadata = match fs::metadata(&path) {
        Ok(m) if m.is_file() => m,
        _ => {
            tracing::warn!("Part {} not found at {}", index, path.display());
            return Err(ReassemblyError::PartMissing(index));
        }
    };
    if metadata.len() != record.length {
        tracing::warn!(
            "Part {} has length {}, expected {}",
            index,
            metadata.len(),
            record.length
        );
        return Err(ReassemblyError::PartMissing(index));
    }

    let crc = checksum::file_crc32(&path).map_err(|_| ReassemblyError::PartMissing(index))?;
    if crc != record.crc32 {
        tracing::warn!(
            "Part {} checksum mismatch (expected {:08x}, got {:08x})",
            index,
            record.crc32,
            crc
        );
        return Err(ReassemblyError::PartCorrupt(index));
    }

    Ok(())
}

/// Concatenate verified parts into the destination, via a temporary file
/// renamed into place only after the whole-asset checksum matches.
fn concatenate(
    manifest: &Manifest,
    parts_dir: &Path,
    dest_path: &Path,
) -> Result<PathBuf, ReassemblyError> {
    if let Some(parent) = dest_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut partial_name = dest_path.as_os_str().to_os_string();
    partial_name.push(".partial");
    let partial_path = PathBuf::from(partial_name);

    match write_partial(manifest, parts_dir, &partial_path) {
        Ok(()) => {
            fs::rename(&partial_path, dest_path)
                .map_err(|e| map_write_err(e, dest_path))?;
            tracing::info!(
                "Reassembled {} ({} bytes) at {}",
                manifest.file_name,
                manifest.total_size,
                dest_path.display()
            );
            Ok(dest_path.to_path_buf())
        }
        Err(e) => {
            // A failed reconstruction must leave nothing behind
            let _ = fs::remove_file(&partial_path);
            Err(e)
        }
    }
}

fn write_partial(
    manifest: &Manifest,
    parts_dir: &Path,
    partial_path: &Path,
) -> Result<(), ReassemblyError> {
    let file = File::create(partial_path).map_err(|e| map_write_err(e, partial_path))?;
    let mut writer = BufWriter::new(file);
    let mut asset_hasher = Crc32::new();
    let mut buf = vec![0u8; COPY_BUF_LEN];

    for part in &manifest.parts {
        let path = parts_dir.join(manifest.part_relative_path(part.index));
        let part_file =
            File::open(&path).map_err(|_| ReassemblyError::PartMissing(part.index))?;
        let mut reader = BufReader::new(part_file);

        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|_| ReassemblyError::PartMissing(part.index))?;
            if n == 0 {
                break;
            }
            asset_hasher.update(&buf[..n]);
            writer
                .write_all(&buf[..n])
                .map_err(|e| map_write_err(e, partial_path))?;
        }
    }

    writer.flush().map_err(|e| map_write_err(e, partial_path))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| map_write_err(e, partial_path))?;

    if asset_hasher.finalize() != manifest.asset_crc32 {
        tracing::warn!("Whole-asset checksum mismatch for {}", manifest.file_name);
        return Err(ReassemblyError::AssetCorrupt);
    }

    Ok(())
}

fn map_write_err(e: io::Error, path: &Path) -> ReassemblyError {
    if e.kind() == ErrorKind::StorageFull {
        ReassemblyError::InsufficientStorage {
            path: path.to_path_buf(),
        }
    } else {
        ReassemblyError::IoError(e)
    }
}
