//! Gallery loading.
//!
//! Manifest records are read and decoded by a small pool of scoped
//! worker threads. Results are slotted back into manifest order, so
//! gallery insertion order never depends on which decode finishes first. A record that fails is
//! logged and left out; the rest of the gallery still loads.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use tessella_match::{Gallery, GalleryEntry, MatchError, RgbaImage};

use crate::manifest::Manifest;

/// Errors raised while loading the gallery.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The manifest file could not be read.
    #[error("failed to read manifest {path}: {source}")]
    ManifestRead {
        /// Manifest location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The manifest is not a JSON array of `{ path, name }` records.
    #[error("malformed manifest: {0}")]
    ManifestParse(#[source] serde_json::Error),

    /// A tile image could not be read from disk.
    #[error("failed to read tile image {path}: {source}")]
    ImageRead {
        /// Image location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A tile image could not be decoded.
    #[error("failed to decode tile image {path}: {source}")]
    ImageDecode {
        /// Image location.
        path: PathBuf,
        /// Underlying decode error.
        source: MatchError,
    },

    /// The decode task for a tile died before producing a result.
    #[error("decode task for {path} did not complete")]
    TaskFailed {
        /// Image location.
        path: PathBuf,
    },
}

/// A manifest record that did not make it into the gallery.
#[derive(Debug)]
pub struct EntryFailure {
    /// Position of the record in the manifest.
    pub index: usize,
    /// Display name from the manifest.
    pub name: String,
    /// Why the record was skipped.
    pub error: LoadError,
}

/// Outcome of loading a manifest: the (possibly partial) gallery and
/// the records that were skipped.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully decoded entries, in manifest order.
    pub gallery: Gallery,
    /// Skipped records, in manifest order.
    pub failures: Vec<EntryFailure>,
}

impl LoadReport {
    /// Returns `true` if every record loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read the manifest at `path` and load every tile it lists.
///
/// # Errors
///
/// Returns [`LoadError::ManifestRead`] or [`LoadError::ManifestParse`]
/// when the manifest itself is unusable. Per-tile failures do not fail
/// the load; they are listed in [`LoadReport::failures`].
pub fn load(path: &Path) -> Result<LoadReport, LoadError> {
    let manifest = Manifest::read(path)?;
    Ok(load_gallery(&manifest))
}

/// Decode every record of `manifest` concurrently.
///
/// Records are pulled from a shared cursor by at most
/// [`available_parallelism`](std::thread::available_parallelism) workers,
/// the calling thread among them, so the load proceeds even when no
/// extra thread can be spawned.
#[must_use]
pub fn load_gallery(manifest: &Manifest) -> LoadReport {
    let records = manifest.records();
    let worker_count = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(manifest.len().max(1));
    tracing::debug!(records = manifest.len(), workers = worker_count, "loading gallery");

    let cursor = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();
    let work = |tx: mpsc::Sender<(usize, Result<RgbaImage, LoadError>)>| {
        loop {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(record) = records.get(index) else {
                break;
            };
            if tx.send((index, load_image(&manifest.resolve(record)))).is_err() {
                break;
            }
        }
    };

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(worker_count - 1);
        for worker in 1..worker_count {
            let tx = tx.clone();
            match std::thread::Builder::new()
                .name(format!("gallery-load-{worker}"))
                .spawn_scoped(scope, || work(tx))
            {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    tracing::warn!(%error, "could not start gallery worker");
                    break;
                }
            }
        }
        work(tx);
        // Joined here so a panicked worker does not re-panic the scope.
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("gallery worker panicked");
            }
        }
    });

    let mut slots: Vec<Option<Result<RgbaImage, LoadError>>> =
        std::iter::repeat_with(|| None).take(records.len()).collect();
    for (index, outcome) in rx {
        slots[index] = Some(outcome);
    }
    // A worker that panicked mid-record leaves that slot empty.
    let outcomes = slots.into_iter().zip(records).map(|(slot, record)| {
        slot.unwrap_or_else(|| {
            Err(LoadError::TaskFailed {
                path: manifest.resolve(record),
            })
        })
    });

    let mut entries = Vec::with_capacity(records.len());
    let mut failures = Vec::new();
    for (index, (record, outcome)) in records.iter().zip(outcomes).enumerate() {
        match outcome {
            Ok(image) => {
                let entry = GalleryEntry::new(record.name.clone(), image);
                tracing::debug!(index, name = %record.name, size = %entry.dimensions(), "loaded tile");
                entries.push(entry);
            }
            Err(error) => {
                tracing::warn!(index, name = %record.name, %error, "skipping gallery entry");
                failures.push(EntryFailure {
                    index,
                    name: record.name.clone(),
                    error,
                });
            }
        }
    }

    tracing::info!(
        loaded = entries.len(),
        skipped = failures.len(),
        "gallery loaded"
    );

    LoadReport {
        gallery: Gallery::new(entries),
        failures,
    }
}

/// Read and decode one tile.
fn load_image(path: &Path) -> Result<RgbaImage, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    tessella_match::decode(&bytes).map_err(|source| LoadError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })
}
