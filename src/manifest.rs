//! Partitioned asset manifests
//!
//! The manifest is the authoritative description of how one oversized
//! model file was split: total size, chunk size, part layout, and the
//! checksums needed to rebuild it byte-exactly. It is written once at
//! packaging time and read-only thereafter.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Suffix appended to the asset file name to form the manifest file name.
const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Manifest-related errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to access manifest file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to serialize/deserialize manifest JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Unsupported manifest version: {0}")]
    UnsupportedVersion(u32),
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("Part count is {found}, expected {expected}")]
    PartCountMismatch { found: u32, expected: u32 },
    #[error("Part indices are not the contiguous range 1..={expected}")]
    NonContiguousParts { expected: u32 },
    #[error("Part {index} has length {found}, expected {expected}")]
    PartLengthMismatch { index: u32, found: u64, expected: u64 },
    #[error("Part lengths sum to {found}, expected total size {expected}")]
    TotalSizeMismatch { found: u64, expected: u64 },
}

/// Where part files are placed relative to the parts directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// All parts share one directory, disambiguated by the index suffix.
    Flat,
    /// Each part lives in its own `<baseName>-part<N>` subdirectory.
    Foldered,
}

/// One contiguous byte range of the asset, stored as an individual file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    /// 1-based sequence index.
    pub index: u32,
    /// Byte length of this part.
    pub length: u64,
    /// CRC32 of this part's content.
    pub crc32: u32,
}

/// Authoritative description of one partitioned asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version.
    pub version: u32,
    /// Original file name of the asset, e.g. `Phi-3-mini-4k-instruct-q4.gguf`.
    pub file_name: String,
    /// Total byte size of the original file.
    pub total_size: u64,
    /// Maximum part size used when splitting.
    pub chunk_size: u64,
    /// Placement convention for part files.
    pub layout: LayoutMode,
    /// Per-part records, ordered by index.
    pub parts: Vec<PartRecord>,
    /// CRC32 of the whole original file.
    pub asset_crc32: u32,
}

impl Manifest {
    /// Number of parts the asset was split into.
    pub fn part_count(&self) -> u32 {
        self.parts.len() as u32
    }

    /// Expected byte length of the part at `index`.
    ///
    /// Every part has the full chunk size except the last, which carries
    /// the remainder (or a full chunk when the total divides evenly).
    pub fn expected_part_len(&self, index: u32) -> u64 {
        if index < self.part_count() {
            self.chunk_size
        } else {
            self.total_size - self.chunk_size * u64::from(self.part_count() - 1)
        }
    }

    /// Path of the part at `index`, relative to the parts directory.
    pub fn part_relative_path(&self, index: u32) -> PathBuf {
        part_relative_path(&self.file_name, self.layout, index)
    }

    /// Check the structural invariants of this manifest.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(self.version));
        }
        if self.chunk_size == 0 {
            return Err(ManifestError::ZeroChunkSize);
        }

        let expected_count = self.total_size.div_ceil(self.chunk_size) as u32;
        if self.part_count() != expected_count {
            return Err(ManifestError::PartCountMismatch {
                found: self.part_count(),
                expected: expected_count,
            });
        }

        let mut sum = 0u64;
        for (i, part) in self.parts.iter().enumerate() {
            let index = i as u32 + 1;
            if part.index != index {
                return Err(ManifestError::NonContiguousParts {
                    expected: expected_count,
                });
            }
            let expected = self.expected_part_len(index);
            if part.length != expected {
                return Err(ManifestError::PartLengthMismatch {
                    index,
                    found: part.length,
                    expected,
                });
            }
            sum += part.length;
        }

        if sum != self.total_size {
            return Err(ManifestError::TotalSizeMismatch {
                found: sum,
                expected: self.total_size,
            });
        }

        Ok(())
    }

    /// Load and validate a manifest from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Manifest, ManifestError> {
        let json = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write the manifest to disk.
    ///
    /// Writes through a temporary file and renames it into place, so a
    /// crash mid-write never leaves a readable half-manifest behind.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ManifestError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;

        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "manifest.json".into());
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        fs::write(&tmp_path, &json)?;
        fs::rename(&tmp_path, path)?;

        tracing::debug!("Wrote manifest: {}", path.display());
        Ok(())
    }

    /// Manifest file name for an asset, e.g. `model.gguf.manifest.json`.
    pub fn manifest_file_name(file_name: &str) -> String {
        format!("{file_name}{MANIFEST_SUFFIX}")
    }
}

/// Part file name for an asset, e.g. `model.gguf.part3`.
pub fn part_file_name(file_name: &str, index: u32) -> String {
    format!("{file_name}.part{index}")
}

/// Path of a part relative to the parts directory, per the layout mode.
pub fn part_relative_path(file_name: &str, layout: LayoutMode, index: u32) -> PathBuf {
    let part_name = part_file_name(file_name, index);
    match layout {
        LayoutMode::Flat => PathBuf::from(part_name),
        LayoutMode::Foldered => {
            PathBuf::from(format!("{}-part{index}", base_name(file_name))).join(part_name)
        }
    }
}

/// File name without its final extension, used for part directories.
fn base_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

/// Scan a directory for asset manifests
///
/// Returns a parsed manifest for every `*.manifest.json` file found,
/// sorted by asset file name. Entries that fail to parse or validate
/// are skipped.
pub fn scan_manifests<P: AsRef<Path>>(directory: P) -> Result<Vec<Manifest>, ManifestError> {
    let directory = directory.as_ref();

    if !directory.is_dir() {
        tracing::warn!("Manifest scan path is not a directory: {}", directory.display());
        return Ok(vec![]);
    }

    let mut manifests = vec![];

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let is_manifest = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX));
        if !is_manifest {
            continue;
        }

        match Manifest::load(&path) {
            Ok(manifest) => {
                tracing::debug!("Found manifest: {}", manifest.file_name);
                manifests.push(manifest);
            }
            Err(e) => {
                tracing::warn!("Failed to read manifest {:?}: {}", path, e);
            }
        }
    }

    manifests.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    tracing::info!(
        "Found {} manifest(s) in {}",
        manifests.len(),
        directory.display()
    );

    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_manifest() -> Manifest {
        Manifest {
            version: MANIFEST_VERSION,
            file_name: "model-q4.gguf".to_string(),
            total_size: 1_300_000,
            chunk_size: 500_000,
            layout: LayoutMode::Flat,
            parts: vec![
                PartRecord {
                    index: 1,
                    length: 500_000,
                    crc32: 0xAAAA_0001,
                },
                PartRecord {
                    index: 2,
                    length: 500_000,
                    crc32: 0xAAAA_0002,
                },
                PartRecord {
                    index: 3,
                    length: 300_000,
                    crc32: 0xAAAA_0003,
                },
            ],
            asset_crc32: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn test_part_file_name() {
        assert_eq!(part_file_name("model-q4.gguf", 1), "model-q4.gguf.part1");
        assert_eq!(part_file_name("model-q4.gguf", 12), "model-q4.gguf.part12");
    }

    #[test]
    fn test_part_relative_path_flat() {
        let path = part_relative_path("model-q4.gguf", LayoutMode::Flat, 2);
        assert_eq!(path, PathBuf::from("model-q4.gguf.part2"));
    }

    #[test]
    fn test_part_relative_path_foldered() {
        let path = part_relative_path("model-q4.gguf", LayoutMode::Foldered, 2);
        assert_eq!(
            path,
            PathBuf::from("model-q4-part2").join("model-q4.gguf.part2")
        );
    }

    #[test]
    fn test_manifest_file_name() {
        assert_eq!(
            Manifest::manifest_file_name("model-q4.gguf"),
            "model-q4.gguf.manifest.json"
        );
    }

    #[test]
    fn test_expected_part_len() {
        let manifest = sample_manifest();
        assert_eq!(manifest.expected_part_len(1), 500_000);
        assert_eq!(manifest.expected_part_len(2), 500_000);
        assert_eq!(manifest.expected_part_len(3), 300_000);
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample_manifest().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_part_count() {
        let mut manifest = sample_manifest();
        manifest.parts.pop();
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::PartCountMismatch { found: 2, expected: 3 })
        ));
    }

    #[test]
    fn test_validate_rejects_index_gap() {
        let mut manifest = sample_manifest();
        manifest.parts[1].index = 5;
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::NonContiguousParts { expected: 3 })
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_part_length() {
        let mut manifest = sample_manifest();
        manifest.parts[0].length = 400_000;
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::PartLengthMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut manifest = sample_manifest();
        manifest.chunk_size = 0;
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::ZeroChunkSize)
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_version() {
        let mut manifest = sample_manifest();
        manifest.version = 99;
        assert!(matches!(
            manifest.validate(),
            Err(ManifestError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir
            .path()
            .join(Manifest::manifest_file_name("model-q4.gguf"));

        let manifest = sample_manifest();
        manifest.save(&path).unwrap();
        let loaded = Manifest::load(&path).unwrap();

        assert_eq!(manifest, loaded);
    }

    #[test]
    fn test_save_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let path_a = temp_dir.path().join("a.manifest.json");
        let path_b = temp_dir.path().join("b.manifest.json");

        let manifest = sample_manifest();
        manifest.save(&path_a).unwrap();
        manifest.save(&path_b).unwrap();

        assert_eq!(
            fs::read(&path_a).unwrap(),
            fs::read(&path_b).unwrap()
        );
    }

    #[test]
    fn test_scan_manifests() {
        let temp_dir = TempDir::new().unwrap();

        let mut first = sample_manifest();
        first.file_name = "b-model.gguf".to_string();
        first
            .save(temp_dir.path().join(Manifest::manifest_file_name("b-model.gguf")))
            .unwrap();

        let mut second = sample_manifest();
        second.file_name = "a-model.gguf".to_string();
        second
            .save(temp_dir.path().join(Manifest::manifest_file_name("a-model.gguf")))
            .unwrap();

        // A corrupt manifest is skipped, not fatal
        fs::write(
            temp_dir.path().join("broken.gguf.manifest.json"),
            "not json",
        )
        .unwrap();
        // Unrelated files are ignored
        fs::write(temp_dir.path().join("readme.txt"), "hello").unwrap();

        let manifests = scan_manifests(temp_dir.path()).unwrap();

        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].file_name, "a-model.gguf");
        assert_eq!(manifests[1].file_name, "b-model.gguf");
    }

    #[test]
    fn test_scan_nonexistent_directory() {
        let manifests = scan_manifests("/this/path/does/not/exist").unwrap();
        assert!(manifests.is_empty());
    }
}
