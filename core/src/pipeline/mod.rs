//! Batch orchestration
//!
//! Each input file walks the stages decode, classify, de-identify, write;
//! a failure at any stage terminates that file only and the batch moves on.
//! Files are processed by a bounded worker pool; the only mutable state
//! shared between workers is the destination collision table and the
//! pseudonym map, each behind its own mutex.

pub mod report;

pub use report::RunReport;

use crate::classify::{classify, Manifest};
use crate::decode;
use crate::deid::{apply_policy, remap_uid, DeidPolicy};
use crate::error::{Result, SortError};
use crate::sort::{write_file, DestinationTable};
use crate::types::{DicomRecord, FileStatus, SortResult, Stage};
use dicom_object::meta::FileMetaTableBuilder;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Cooperative cancellation flag
///
/// Cancelling stops dispatch of new files; files already in flight finish
/// or fail cleanly, so no partially written output is left behind.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tuning knobs for a batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker thread count; 0 means one per logical CPU
    pub workers: usize,

    /// Draw a progress bar on stderr
    pub progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            progress: false,
        }
    }
}

/// The batch pipeline: decode, classify, de-identify, write
///
/// Owns the read-only manifest and policy for the lifetime of a run.
pub struct Pipeline {
    manifest: Manifest,
    policy: DeidPolicy,
    dest_root: PathBuf,
    options: BatchOptions,
}

impl Pipeline {
    pub fn new(manifest: Manifest, policy: DeidPolicy, dest_root: &Path) -> Self {
        Self {
            manifest,
            policy,
            dest_root: dest_root.to_path_buf(),
            options: BatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the batch to completion
    ///
    /// Every input file yields exactly one [`SortResult`]; per-file errors
    /// are recorded, never propagated. The only fallible setup step is
    /// building the worker pool.
    pub fn run(&self, files: &[PathBuf], cancel: &CancelToken) -> Result<RunReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .build()
            .map_err(|e| SortError::Config(format!("cannot build worker pool: {}", e)))?;

        let table = DestinationTable::new();
        let pseudonyms: Mutex<BTreeMap<String, String>> = Mutex::new(BTreeMap::new());
        let bar = if self.options.progress {
            ProgressBar::new(files.len() as u64)
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<SortResult> = pool.install(|| {
            files
                .par_iter()
                .progress_with(bar)
                .map(|path| {
                    if cancel.is_cancelled() {
                        debug!("Cancelled before dispatch: {}", path.display());
                        SortResult::skipped(path)
                    } else {
                        self.process_file(path, &table, &pseudonyms)
                    }
                })
                .collect()
        });

        let pseudonyms = pseudonyms.into_inner().expect("pseudonym map poisoned");
        Ok(RunReport::new(results, pseudonyms))
    }

    /// Runs one file through the full state machine
    fn process_file(
        &self,
        source: &Path,
        table: &DestinationTable,
        pseudonyms: &Mutex<BTreeMap<String, String>>,
    ) -> SortResult {
        // Pending -> Decoded
        let file_obj = match decode::open(source) {
            Ok(obj) => obj,
            Err(e) => {
                warn!("Decode failed for {}: {}", source.display(), e);
                return SortResult::failed(source, Stage::Decode, e.to_string());
            }
        };
        let record = DicomRecord::from_dicom(source, &file_obj);

        // Decoded -> Classified
        let category = match classify(&record, &self.manifest) {
            Ok(category) => category,
            Err(e) => {
                warn!("Classification failed for {}: {}", source.display(), e);
                return SortResult::failed(source, Stage::Classify, e.to_string());
            }
        };

        // Classified -> Deidentified
        let transfer_syntax = file_obj.meta().transfer_syntax().to_string();
        let sop_class_uid = file_obj
            .meta()
            .media_storage_sop_class_uid
            .trim_end_matches(['\0', ' '])
            .to_string();
        let meta_sop_uid = file_obj
            .meta()
            .media_storage_sop_instance_uid
            .trim_end_matches(['\0', ' '])
            .to_string();

        let mut dataset = file_obj.into_inner();
        let outcome = match apply_policy(&mut dataset, &self.policy) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("De-identification failed for {}: {}", source.display(), e);
                return SortResult::failed(source, Stage::Deidentify, e.to_string());
            }
        };
        if let Some((original, pseud)) = &outcome.pseudonym {
            pseudonyms
                .lock()
                .expect("pseudonym map poisoned")
                .entry(original.clone())
                .or_insert_with(|| pseud.clone());
        }

        // Deidentified -> Written
        // Destinations are rendered from the transformed dataset; original
        // UIDs and identifiers never reach the output tree.
        let record = DicomRecord::from_dicom(source, &dataset);
        let patient_label = outcome.pseudonym.as_ref().map(|(_, p)| p.as_str());
        let relative = self
            .manifest
            .template
            .render(&category, &record, patient_label);
        let destination = table.claim(self.dest_root.join(relative));

        // Meta must agree with the (possibly remapped) dataset SOP UID
        let sop_uid = match outcome.sop_instance_uid {
            Some(uid) => uid,
            None if self.policy.remap_uids() => {
                remap_uid(self.policy.uid_root(), &meta_sop_uid, self.policy.salt())
            }
            None => meta_sop_uid,
        };

        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(&transfer_syntax)
            .media_storage_sop_class_uid(&sop_class_uid)
            .media_storage_sop_instance_uid(&sop_uid);
        let rebuilt = match dataset.with_meta(meta) {
            Ok(obj) => obj,
            Err(e) => {
                return SortResult {
                    source: source.to_path_buf(),
                    category: Some(category),
                    destination: Some(destination),
                    status: FileStatus::Failed {
                        stage: Stage::Write,
                        reason: e.to_string(),
                    },
                }
            }
        };

        match write_file(&rebuilt, &destination) {
            Ok(()) => {
                info!("{} -> {}", source.display(), destination.display());
                SortResult::written(source, category, destination)
            }
            Err(e) => {
                warn!("Write failed for {}: {}", source.display(), e);
                SortResult {
                    source: source.to_path_buf(),
                    category: Some(category),
                    destination: Some(destination),
                    status: FileStatus::Failed {
                        stage: Stage::Write,
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tags::{
        PATIENT_ID, SERIES_DESCRIPTION, SOP_INSTANCE_UID, STUDY_INSTANCE_UID,
    };
    use dicom_core::{DataElement, PrimitiveValue, VR};
    use dicom_object::InMemDicomObject;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
    const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";

    fn write_test_dicom(
        path: &Path,
        patient_id: &str,
        study_uid: &str,
        sop_uid: &str,
        series_description: &str,
    ) {
        let mut dcm = InMemDicomObject::new_empty();
        dcm.put(DataElement::new(
            PATIENT_ID,
            VR::LO,
            PrimitiveValue::from(patient_id),
        ));
        dcm.put(DataElement::new(
            STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(study_uid),
        ));
        dcm.put(DataElement::new(
            SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(sop_uid),
        ));
        dcm.put(DataElement::new(
            SERIES_DESCRIPTION,
            VR::LO,
            PrimitiveValue::from(series_description),
        ));

        let obj = dcm
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(EXPLICIT_VR_LE)
                    .media_storage_sop_class_uid(SECONDARY_CAPTURE)
                    .media_storage_sop_instance_uid(sop_uid),
            )
            .unwrap();
        obj.write_to_file(path).unwrap();
    }

    fn test_manifest() -> Manifest {
        Manifest::from_json(
            r#"{ "rules": [ { "match": "T1", "category": "anatomical" } ] }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_batch_isolation_one_bad_file() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();

        write_test_dicom(
            &input.path().join("a.dcm"),
            "PAT001",
            "1.2.3",
            "1.2.3.1",
            "T1 MPRAGE",
        );
        write_test_dicom(
            &input.path().join("b.dcm"),
            "PAT001",
            "1.2.3",
            "1.2.3.2",
            "DWI",
        );
        File::create(input.path().join("junk.dcm"))
            .unwrap()
            .write_all(b"not dicom at all")
            .unwrap();

        let files = decode::collect_input_files(input.path(), false).unwrap();
        assert_eq!(files.len(), 3);

        let pipeline = Pipeline::new(
            test_manifest(),
            DeidPolicy::default_policy("anon"),
            output.path(),
        );
        let report = pipeline.run(&files, &CancelToken::new()).unwrap();

        assert_eq!(report.total(), 3);
        assert_eq!(report.written(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.failures().next().unwrap().failure_stage(),
            Some(Stage::Decode)
        );

        // Classification routed the files and the outputs exist
        let written: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.is_written())
            .collect();
        for result in &written {
            assert!(result.destination.as_ref().unwrap().exists());
        }
        let categories: Vec<_> = written
            .iter()
            .filter_map(|r| r.category.as_deref())
            .collect();
        assert!(categories.contains(&"anatomical"));
        assert!(categories.contains(&"unsorted"));
    }

    #[test]
    fn test_written_output_is_deidentified() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_test_dicom(
            &input.path().join("a.dcm"),
            "PAT001",
            "1.2.3",
            "1.2.3.1",
            "T1 MPRAGE",
        );

        let files = decode::collect_input_files(input.path(), false).unwrap();
        let pipeline = Pipeline::new(
            test_manifest(),
            DeidPolicy::default_policy("anon"),
            output.path(),
        );
        let report = pipeline.run(&files, &CancelToken::new()).unwrap();
        assert_eq!(report.written(), 1);

        let destination = report.results[0].destination.clone().unwrap();
        let reopened = dicom_object::open_file(&destination).unwrap();
        let record = DicomRecord::from_dicom(&destination, &reopened);

        let patient_id = record.patient_id.unwrap();
        assert!(patient_id.starts_with("anon_"));
        assert_ne!(record.study_instance_uid.as_deref(), Some("1.2.3"));
        // Dataset and file meta agree on the remapped SOP UID
        assert_eq!(
            reopened
                .meta()
                .media_storage_sop_instance_uid
                .trim_end_matches(['\0', ' ']),
            record.sop_instance_uid.as_deref().unwrap()
        );
        assert_eq!(report.pseudonyms.get("PAT001"), Some(&patient_id));
    }

    #[test]
    fn test_output_path_uses_remapped_study_uid() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_test_dicom(
            &input.path().join("a.dcm"),
            "PAT001",
            "1.2.840.555.777",
            "1.2.840.555.777.1",
            "T1 MPRAGE",
        );

        let files = decode::collect_input_files(input.path(), false).unwrap();
        let pipeline = Pipeline::new(
            test_manifest(),
            DeidPolicy::default_policy("anon"),
            output.path(),
        );
        let report = pipeline.run(&files, &CancelToken::new()).unwrap();
        assert_eq!(report.written(), 1);

        // The original study UID must not appear anywhere in the destination
        let destination = report.results[0].destination.clone().unwrap();
        assert!(!destination.to_string_lossy().contains("1.2.840.555.777"));

        // The study directory is the remapped UID carried by the output file
        let reopened = dicom_object::open_file(&destination).unwrap();
        let record = DicomRecord::from_dicom(&destination, &reopened);
        let study_dir = destination.parent().unwrap().file_name().unwrap();
        assert_eq!(
            study_dir.to_string_lossy(),
            record.study_instance_uid.unwrap()
        );
    }

    #[test]
    fn test_destination_collisions_never_overwrite() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        for (i, sub) in ["one", "two"].iter().enumerate() {
            let dir = input.path().join(sub);
            std::fs::create_dir(&dir).unwrap();
            // Same study and filename in both directories
            write_test_dicom(
                &dir.join("scan.dcm"),
                "PAT001",
                "1.2.3",
                &format!("1.2.3.{}", i + 1),
                "T1",
            );
        }

        let files = decode::collect_input_files(input.path(), true).unwrap();
        assert_eq!(files.len(), 2);

        let pipeline = Pipeline::new(
            test_manifest(),
            DeidPolicy::default_policy("anon"),
            output.path(),
        );
        let report = pipeline.run(&files, &CancelToken::new()).unwrap();

        assert_eq!(report.written(), 2);
        let destinations: Vec<_> = report
            .results
            .iter()
            .filter_map(|r| r.destination.clone())
            .collect();
        assert_ne!(destinations[0], destinations[1]);
        assert!(destinations.iter().all(|d| d.exists()));
    }

    #[test]
    fn test_strict_mode_records_classify_failure() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_test_dicom(
            &input.path().join("a.dcm"),
            "PAT001",
            "1.2.3",
            "1.2.3.1",
            "localizer",
        );

        let manifest = test_manifest().with_mode(crate::classify::ClassifyMode::Strict);
        let files = decode::collect_input_files(input.path(), false).unwrap();
        let pipeline = Pipeline::new(manifest, DeidPolicy::default_policy("anon"), output.path());
        let report = pipeline.run(&files, &CancelToken::new()).unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.failures().next().unwrap().failure_stage(),
            Some(Stage::Classify)
        );
    }

    #[test]
    fn test_cancelled_run_skips_everything() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_test_dicom(
            &input.path().join("a.dcm"),
            "PAT001",
            "1.2.3",
            "1.2.3.1",
            "T1",
        );

        let cancel = CancelToken::new();
        cancel.cancel();

        let files = decode::collect_input_files(input.path(), false).unwrap();
        let pipeline = Pipeline::new(
            test_manifest(),
            DeidPolicy::default_policy("anon"),
            output.path(),
        );
        let report = pipeline.run(&files, &cancel).unwrap();

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.written(), 0);
        assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_single_worker_pool() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        for i in 0..4 {
            write_test_dicom(
                &input.path().join(format!("{}.dcm", i)),
                "PAT001",
                "1.2.3",
                &format!("1.2.3.{}", i),
                "T1",
            );
        }

        let files = decode::collect_input_files(input.path(), false).unwrap();
        let pipeline = Pipeline::new(
            test_manifest(),
            DeidPolicy::default_policy("anon"),
            output.path(),
        )
        .with_options(BatchOptions {
            workers: 1,
            progress: false,
        });
        let report = pipeline.run(&files, &CancelToken::new()).unwrap();
        assert_eq!(report.written(), 4);
    }
}
