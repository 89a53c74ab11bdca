//! ModelPart Library
//!
//! Splits oversized model files into package-safe parts and reassembles
//! them byte-exactly on the target device.
//!
//! Multi-gigabyte model weights routinely exceed hard per-file limits of
//! packaging pipelines (2 GiB file ceilings, mobile package caps). The
//! [`partition`] module produces bounded-size parts plus a manifest at
//! packaging time; the [`reassemble`] module verifies the shipped parts
//! and reconstructs the original file before it is handed to a model
//! loader.

pub mod checksum;
pub mod manifest;
pub mod partition;
pub mod reassemble;

pub use manifest::{LayoutMode, Manifest, ManifestError};
pub use partition::{partition, PartitionError};
pub use reassemble::{reassemble, ReassemblyError};

/// Format a byte count as a human-readable size string.
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;

    if bytes < 1024.0 {
        format!("{} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(500 * 1024 * 1024), "500.00 MB");
        assert!(format_size(3 * 1024 * 1024 * 1024).contains("GB"));
    }
}
