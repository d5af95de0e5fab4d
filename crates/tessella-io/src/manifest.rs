//! Gallery manifest parsing.
//!
//! A manifest is a JSON array of `{ "path": ..., "name": ... }` records.
//! Array order becomes gallery insertion order. Relative paths are
//! resolved against the directory holding the manifest file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::gallery::LoadError;

/// One reference tile listed in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Image file location, absolute or relative to the manifest.
    pub path: PathBuf,
    /// Display name shown in match results.
    pub name: String,
}

impl ManifestRecord {
    /// Create a record.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

/// A parsed gallery manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    records: Vec<ManifestRecord>,
    base_dir: PathBuf,
}

impl Manifest {
    /// Build a manifest from records whose relative paths resolve
    /// against `base_dir`.
    #[must_use]
    pub fn new(records: Vec<ManifestRecord>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            records,
            base_dir: base_dir.into(),
        }
    }

    /// Parse manifest JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::ManifestParse`] if `json` is not an array of
    /// `{ path, name }` records.
    pub fn from_json(json: &str, base_dir: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let records: Vec<ManifestRecord> =
            serde_json::from_str(json).map_err(LoadError::ManifestParse)?;
        Ok(Self::new(records, base_dir))
    }

    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::ManifestRead`] if the file cannot be read and
    /// [`LoadError::ManifestParse`] if its contents are malformed.
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let json = std::fs::read_to_string(path).map_err(|source| LoadError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_json(&json, base_dir)
    }

    /// Records in manifest order.
    #[must_use]
    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the manifest lists no tiles.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Filesystem location of `record`'s image.
    #[must_use]
    pub fn resolve(&self, record: &ManifestRecord) -> PathBuf {
        if record.path.is_absolute() {
            record.path.clone()
        } else {
            self.base_dir.join(&record.path)
        }
    }
}
