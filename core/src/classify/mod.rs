//! Manifest-driven classification
//!
//! Rules are evaluated in declared order and the first match wins; rule
//! order is the tie-break, not match quality. For a fixed manifest the
//! mapping from record to category is a pure function.

pub mod manifest;

pub use manifest::{ClassificationRule, ClassifyMode, Manifest, MatchField, MatchKind, RuleSpec};

use crate::error::{Result, SortError};
use crate::types::DicomRecord;

/// Resolves the destination category for a decoded record
///
/// # Errors
///
/// In [`ClassifyMode::Strict`], returns [`SortError::Unclassified`] when no
/// rule matches. Lenient mode falls back to the manifest's default category
/// instead.
///
/// # Example
///
/// ```
/// use dicomsort_core::classify::{classify, Manifest};
/// use dicomsort_core::types::DicomRecord;
/// use std::path::PathBuf;
///
/// let manifest = Manifest::from_json(
///     r#"{ "rules": [ { "match": "T1", "category": "anatomical" } ] }"#,
/// )
/// .unwrap();
///
/// let mut record = DicomRecord {
///     source: PathBuf::from("scan.dcm"),
///     patient_id: None,
///     patient_name: None,
///     study_instance_uid: None,
///     series_instance_uid: None,
///     sop_instance_uid: None,
///     series_description: Some("T1 MPRAGE".to_string()),
///     study_description: None,
///     modality: None,
///     body_part_examined: None,
///     instance_number: None,
///     number_of_frames: 1,
/// };
/// assert_eq!(classify(&record, &manifest).unwrap(), "anatomical");
///
/// record.series_description = Some("DWI".to_string());
/// assert_eq!(classify(&record, &manifest).unwrap(), "unsorted");
/// ```
pub fn classify(record: &DicomRecord, manifest: &Manifest) -> Result<String> {
    for rule in manifest.rules() {
        if rule.matches(record) {
            return Ok(rule.category.clone());
        }
    }

    match manifest.mode {
        ClassifyMode::Lenient => Ok(manifest.default_category.clone()),
        ClassifyMode::Strict => Err(SortError::Unclassified(
            record.source.display().to_string(),
        )),
    }
}
