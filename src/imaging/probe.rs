//! The image probe seam.
//!
//! Exporters only ever see [`ImageProbe`]. The production implementation is
//! [`RustProbe`](super::rust_probe::RustProbe); tests use the recording
//! [`tests::MockProbe`].

use crate::types::TechnicalAttributes;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unreadable image {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// Reads the physical attributes of a master image.
pub trait ImageProbe: Sync {
    fn probe(&self, path: &Path) -> Result<TechnicalAttributes, ProbeError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Probe that answers from memory and records every call.
    ///
    /// Files whose name is in `missing` fail with [`ProbeError::NotFound`];
    /// every other path returns `attributes`.
    pub struct MockProbe {
        pub attributes: TechnicalAttributes,
        pub missing: Mutex<HashSet<String>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl Default for MockProbe {
        fn default() -> Self {
            Self {
                attributes: sample_attributes(),
                missing: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    pub fn sample_attributes() -> TechnicalAttributes {
        TechnicalAttributes {
            mime_type: "image/tiff".to_string(),
            x_resolution: 300,
            bit_depth: 8,
            samples_per_pixel: 3,
            color_space: "color".to_string(),
            width: 2480,
            height: 3508,
        }
    }

    impl MockProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_missing(names: &[&str]) -> Self {
            let probe = Self::default();
            probe
                .missing
                .lock()
                .unwrap()
                .extend(names.iter().map(|n| n.to_string()));
            probe
        }

        /// File names probed so far, in call order.
        pub fn probed(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ImageProbe for MockProbe {
        fn probe(&self, path: &Path) -> Result<TechnicalAttributes, ProbeError> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.calls.lock().unwrap().push(name.clone());
            if self.missing.lock().unwrap().contains(&name) {
                return Err(ProbeError::NotFound(path.to_path_buf()));
            }
            Ok(self.attributes.clone())
        }
    }

    #[test]
    fn mock_records_calls() {
        let probe = MockProbe::new();
        let attrs = probe.probe(Path::new("/images/img001.tif")).unwrap();
        assert_eq!(attrs.x_resolution, 300);
        assert_eq!(probe.probed(), vec!["img001.tif"]);
    }

    #[test]
    fn mock_reports_missing_files() {
        let probe = MockProbe::with_missing(&["gone.tif"]);
        let err = probe.probe(Path::new("/images/gone.tif")).unwrap_err();
        assert!(matches!(err, ProbeError::NotFound(_)));
        assert!(err.to_string().contains("gone.tif"));
    }
}
