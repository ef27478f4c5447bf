use crate::error::{Result, SortError};
use crate::types::{SortResult, Stage};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Aggregate outcome of a batch run
///
/// Per-file entries are unordered (workers finish in any order) but always
/// traceable back to their source path.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    /// One entry per input file
    pub results: Vec<SortResult>,

    /// Original patient identifier to pseudonym, for the mapping export
    pub pseudonyms: BTreeMap<String, String>,
}

impl RunReport {
    pub fn new(results: Vec<SortResult>, pseudonyms: BTreeMap<String, String>) -> Self {
        Self {
            results,
            pseudonyms,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn written(&self) -> usize {
        self.results.iter().filter(|r| r.is_written()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.total() - self.written() - self.failed()
    }

    /// Iterates over the failed entries
    pub fn failures(&self) -> impl Iterator<Item = &SortResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    /// Failure counts keyed by pipeline stage
    pub fn failures_by_stage(&self) -> BTreeMap<Stage, usize> {
        let mut counts = BTreeMap::new();
        for result in self.failures() {
            if let Some(stage) = result.failure_stage() {
                *counts.entry(stage).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Whether the run stayed within the failure threshold
    pub fn is_success(&self, max_failures: usize) -> bool {
        self.failed() <= max_failures
    }

    /// Serializes the report, with a summary block, as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": {
                "total": self.total(),
                "written": self.written(),
                "skipped": self.skipped(),
                "failed": self.failed(),
            },
            "results": self.results,
            "pseudonyms": self.pseudonyms,
        }))
    }

    /// Writes the original-to-pseudonym mapping as a CSV file
    pub fn write_mapping_csv(&self, path: &Path) -> Result<()> {
        let mut file =
            std::fs::File::create(path).map_err(|e| SortError::write(path, e))?;
        writeln!(file, "original_id_or_name,pseudonym").map_err(|e| SortError::write(path, e))?;
        for (original, pseudonym) in &self.pseudonyms {
            writeln!(file, "{},{}", csv_field(original), csv_field(pseudonym))
                .map_err(|e| SortError::write(path, e))?;
        }
        Ok(())
    }

    /// Writes the failed file list as a CSV file
    pub fn write_error_csv(&self, path: &Path) -> Result<()> {
        let mut file =
            std::fs::File::create(path).map_err(|e| SortError::write(path, e))?;
        writeln!(file, "source,stage,reason").map_err(|e| SortError::write(path, e))?;
        for result in self.failures() {
            if let crate::types::FileStatus::Failed { stage, reason } = &result.status {
                writeln!(
                    file,
                    "{},{},{}",
                    csv_field(&result.source.display().to_string()),
                    stage,
                    csv_field(reason)
                )
                .map_err(|e| SortError::write(path, e))?;
            }
        }
        Ok(())
    }
}

/// Quotes a CSV field when it contains a delimiter, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
