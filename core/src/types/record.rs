use crate::decode::tags::{
    get_int_value, get_string_value, BODY_PART_EXAMINED, INSTANCE_NUMBER, MODALITY,
    NUMBER_OF_FRAMES, PATIENT_ID, PATIENT_NAME, SERIES_DESCRIPTION, SERIES_INSTANCE_UID,
    SOP_INSTANCE_UID, STUDY_DESCRIPTION, STUDY_INSTANCE_UID,
};
use dicom_object::InMemDicomObject;
use std::path::{Path, PathBuf};

/// Immutable decoded representation of one file's header tags
///
/// Built once by the decoder and consumed read-only by the classifier,
/// de-identifier and writer. Absent tags are `None` rather than errors;
/// downstream stages decide whether a missing value matters.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DicomRecord {
    /// Path of the source file this record was decoded from
    pub source: PathBuf,

    /// Patient ID (0010,0020)
    pub patient_id: Option<String>,

    /// Patient Name (0010,0010)
    pub patient_name: Option<String>,

    /// Study Instance UID (0020,000D)
    pub study_instance_uid: Option<String>,

    /// Series Instance UID (0020,000E)
    pub series_instance_uid: Option<String>,

    /// SOP Instance UID (0008,0018)
    pub sop_instance_uid: Option<String>,

    /// Series Description (0008,103E)
    pub series_description: Option<String>,

    /// Study Description (0008,1030)
    pub study_description: Option<String>,

    /// Modality (0008,0060)
    pub modality: Option<String>,

    /// Body Part Examined (0018,0015)
    pub body_part_examined: Option<String>,

    /// Instance Number (0020,0013)
    pub instance_number: Option<i32>,

    /// Number of frames, 1 for single-frame images
    pub number_of_frames: i32,
}

impl DicomRecord {
    /// Builds a record from an already-opened DICOM object
    pub fn from_dicom(source: &Path, dcm: &InMemDicomObject) -> Self {
        Self {
            source: source.to_path_buf(),
            patient_id: get_string_value(dcm, PATIENT_ID),
            patient_name: get_string_value(dcm, PATIENT_NAME),
            study_instance_uid: get_string_value(dcm, STUDY_INSTANCE_UID),
            series_instance_uid: get_string_value(dcm, SERIES_INSTANCE_UID),
            sop_instance_uid: get_string_value(dcm, SOP_INSTANCE_UID),
            series_description: get_string_value(dcm, SERIES_DESCRIPTION),
            study_description: get_string_value(dcm, STUDY_DESCRIPTION),
            modality: get_string_value(dcm, MODALITY),
            body_part_examined: get_string_value(dcm, BODY_PART_EXAMINED),
            instance_number: get_int_value(dcm, INSTANCE_NUMBER),
            number_of_frames: get_int_value(dcm, NUMBER_OF_FRAMES).unwrap_or(1),
        }
    }

    /// Returns the best available patient identifier
    ///
    /// Prefers Patient ID over Patient Name, matching the pseudonym key
    /// selection of the de-identifier.
    pub fn patient_identifier(&self) -> Option<&str> {
        self.patient_id
            .as_deref()
            .or(self.patient_name.as_deref())
    }

    /// Checks if this is a multi-frame instance
    pub fn is_multi_frame(&self) -> bool {
        self.number_of_frames > 1
    }
}
