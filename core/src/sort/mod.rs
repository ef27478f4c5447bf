//! Destination resolution and output writing
//!
//! The [`DestinationTable`] is the only piece of mutable state shared between
//! workers: every destination path must be claimed through it before a write,
//! so two inputs resolving to the same path can never overwrite each other.

mod template;

pub use template::{NamingTemplate, DEFAULT_TEMPLATE};

use crate::error::{Result, SortError};
use dicom_object::{FileDicomObject, InMemDicomObject};
use log::debug;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Run-wide table of claimed destination paths
///
/// A second claim of an already-taken path receives a `_N` suffix before the
/// file extension. Claims are atomic with respect to each other; the claimed
/// path is reserved for the caller even if its write later fails, which keeps
/// the resolution deterministic under concurrency.
#[derive(Debug, Default)]
pub struct DestinationTable {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl DestinationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a destination path, disambiguating on collision
    pub fn claim(&self, candidate: PathBuf) -> PathBuf {
        let mut claimed = self.claimed.lock().expect("destination table poisoned");
        if claimed.insert(candidate.clone()) {
            return candidate;
        }

        let stem = candidate
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = candidate
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()));

        for n in 1.. {
            let name = match &extension {
                Some(ext) => format!("{}_{}{}", stem, n, ext),
                None => format!("{}_{}", stem, n),
            };
            let alternative = candidate.with_file_name(name);
            if claimed.insert(alternative.clone()) {
                debug!(
                    "Destination collision: {} -> {}",
                    candidate.display(),
                    alternative.display()
                );
                return alternative;
            }
        }
        unreachable!("suffix space exhausted")
    }
}

/// Writes a transformed DICOM object to its destination
///
/// Parent directories are created as needed. Filesystem faults come back as
/// [`SortError::Write`] so the pipeline can record them per file.
pub fn write_file(obj: &FileDicomObject<InMemDicomObject>, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SortError::write(destination, e))?;
    }
    obj.write_to_file(destination)
        .map_err(|e| SortError::write(destination, e))?;
    Ok(())
}
