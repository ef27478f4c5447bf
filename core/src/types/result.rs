use std::fmt;
use std::path::{Path, PathBuf};

/// Pipeline stage in which a file failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Decode,
    Classify,
    Deidentify,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decode => "decode",
            Stage::Classify => "classify",
            Stage::Deidentify => "deidentify",
            Stage::Write => "write",
        };
        write!(f, "{}", name)
    }
}

/// Terminal state of a file's trip through the pipeline
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// De-identified copy written to its destination
    Written,
    /// Not dispatched because the run was cancelled
    Skipped,
    /// Failed at `stage` with a human-readable reason
    Failed { stage: Stage, reason: String },
}

/// Per-file outcome of a batch run
///
/// Exactly one `SortResult` exists for every input file, whatever its fate.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SortResult {
    /// Source file path
    pub source: PathBuf,

    /// Category resolved by the classifier, if classification was reached
    pub category: Option<String>,

    /// Destination path, if a write was attempted or completed
    pub destination: Option<PathBuf>,

    /// Terminal status
    pub status: FileStatus,
}

impl SortResult {
    /// Builds a successful result
    pub fn written(source: &Path, category: String, destination: PathBuf) -> Self {
        Self {
            source: source.to_path_buf(),
            category: Some(category),
            destination: Some(destination),
            status: FileStatus::Written,
        }
    }

    /// Builds a result for a file that was never dispatched
    pub fn skipped(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            category: None,
            destination: None,
            status: FileStatus::Skipped,
        }
    }

    /// Builds a failure result attributed to a pipeline stage
    pub fn failed(source: &Path, stage: Stage, reason: String) -> Self {
        Self {
            source: source.to_path_buf(),
            category: None,
            destination: None,
            status: FileStatus::Failed { stage, reason },
        }
    }

    /// Returns whether the file was written successfully
    pub fn is_written(&self) -> bool {
        matches!(self.status, FileStatus::Written)
    }

    /// Returns whether the file failed
    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }

    /// Returns the failure stage, if any
    pub fn failure_stage(&self) -> Option<Stage> {
        match &self.status {
            FileStatus::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
