use crate::error::{Result, SortError};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Action applied to one DICOM tag during de-identification
///
/// In the policy document unit actions are plain strings (`"remove"`) and
/// the replace action carries its value: `{ "replace": "ANONYMIZED" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAction {
    /// Leave the tag untouched
    Keep,
    /// Delete the element entirely
    Remove,
    /// Keep the element with an empty value
    Blank,
    /// Replace the value with a salted pseudonym of itself
    Hash,
    /// Replace the value with a constant
    Replace(String),
}

/// Policy document as written on disk
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySpec {
    /// Salt mixed into pseudonym and UID hashes
    #[serde(default = "default_salt")]
    pub salt: String,

    /// Prefix for remapped UIDs; DICOM UID root rules apply
    #[serde(default = "default_uid_root")]
    pub uid_root: String,

    /// Tag name (DICOM keyword or `GGGG,EEEE`) to action
    #[serde(default)]
    pub tags: BTreeMap<String, TagAction>,

    /// Catch-all action for tags not listed above; absent means pass through
    #[serde(default, rename = "default")]
    pub catch_all: Option<TagAction>,

    /// Rewrite Study/Series/SOP instance UIDs consistently
    #[serde(default = "default_true")]
    pub remap_uids: bool,
}

fn default_salt() -> String {
    "anon".to_string()
}

fn default_uid_root() -> String {
    "9999".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for PolicySpec {
    fn default() -> Self {
        Self {
            salt: default_salt(),
            uid_root: default_uid_root(),
            tags: BTreeMap::new(),
            catch_all: None,
            remap_uids: true,
        }
    }
}

/// Compiled de-identification policy
///
/// Immutable per run. Tag names from the document are resolved to concrete
/// tags at load time so that a typo is a startup failure, not a silently
/// skipped action.
#[derive(Debug, Clone)]
pub struct DeidPolicy {
    salt: String,
    uid_root: String,
    actions: Vec<(Tag, TagAction)>,
    lookup: HashMap<Tag, usize>,
    catch_all: Option<TagAction>,
    remap_uids: bool,
}

impl DeidPolicy {
    /// Loads and validates a policy from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SortError::Config(format!("cannot read policy {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parses a policy from a JSON string
    pub fn from_json(text: &str) -> Result<Self> {
        let spec: PolicySpec = serde_json::from_str(text)?;
        Self::from_spec(spec)
    }

    /// Builds a policy from an already-parsed spec
    ///
    /// # Errors
    ///
    /// Returns [`SortError::Config`] for unresolvable tag names or an
    /// invalid UID root.
    pub fn from_spec(spec: PolicySpec) -> Result<Self> {
        // UID roots must start 1-9 and contain only digits and dots
        let uid_root_format =
            Regex::new(r"^[1-9][0-9.]{0,31}$").expect("uid root pattern is valid");
        if !uid_root_format.is_match(&spec.uid_root) {
            return Err(SortError::Config(format!(
                "invalid uid_root {:?}: must start with 1-9 and contain only digits and dots",
                spec.uid_root
            )));
        }

        let mut actions = Vec::with_capacity(spec.tags.len());
        let mut lookup = HashMap::with_capacity(spec.tags.len());
        for (name, action) in spec.tags {
            let tag = resolve_tag(&name)?;
            if lookup.insert(tag, actions.len()).is_some() {
                return Err(SortError::Config(format!(
                    "tag {} ({}) listed more than once",
                    name, tag
                )));
            }
            actions.push((tag, action));
        }

        Ok(Self {
            salt: spec.salt,
            uid_root: spec.uid_root,
            actions,
            lookup,
            catch_all: spec.catch_all,
            remap_uids: spec.remap_uids,
        })
    }

    /// The built-in policy, equivalent to the legacy batch anonymizer
    ///
    /// Patient name and ID are pseudonymised, remaining identifying fields
    /// are blanked, and instance UIDs are remapped.
    pub fn default_policy(salt: &str) -> Self {
        let mut spec = PolicySpec {
            salt: salt.to_string(),
            ..PolicySpec::default()
        };
        spec.tags
            .insert("PatientName".to_string(), TagAction::Hash);
        spec.tags.insert("PatientID".to_string(), TagAction::Hash);
        for name in [
            "PatientBirthDate",
            "PatientSex",
            "PatientAddress",
            "OtherPatientIDs",
            "OtherPatientNames",
            "EthnicGroup",
            "PatientTelephoneNumbers",
            "AccessionNumber",
            "InstitutionName",
            "InstitutionAddress",
            "ReferringPhysicianName",
            "StudyID",
            "StudyDescription",
            "PerformingPhysicianName",
            "OperatorsName",
            "RequestingPhysician",
            "StudyComments",
        ] {
            spec.tags.insert(name.to_string(), TagAction::Blank);
        }

        Self::from_spec(spec).expect("built-in policy is valid")
    }

    /// Overrides the salt, e.g. from a CLI switch
    pub fn with_salt(mut self, salt: &str) -> Self {
        self.salt = salt.to_string();
        self
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn uid_root(&self) -> &str {
        &self.uid_root
    }

    pub fn remap_uids(&self) -> bool {
        self.remap_uids
    }

    pub fn catch_all(&self) -> Option<&TagAction> {
        self.catch_all.as_ref()
    }

    /// Configured (tag, action) pairs
    pub fn actions(&self) -> &[(Tag, TagAction)] {
        &self.actions
    }

    /// Whether an explicit action is configured for this tag
    pub fn has_action(&self, tag: Tag) -> bool {
        self.lookup.contains_key(&tag)
    }
}

/// Resolves a policy tag name to a concrete tag
///
/// Accepts DICOM keywords from the supported table and the numeric forms
/// `GGGG,EEEE` and `(GGGG,EEEE)`.
pub fn resolve_tag(name: &str) -> Result<Tag> {
    if let Some(tag) = keyword_tag(name) {
        return Ok(tag);
    }

    let numeric = name.trim().trim_start_matches('(').trim_end_matches(')');
    if let Some((group, element)) = numeric.split_once(',') {
        let parsed = u16::from_str_radix(group.trim(), 16)
            .and_then(|g| u16::from_str_radix(element.trim(), 16).map(|e| Tag(g, e)));
        if let Ok(tag) = parsed {
            return Ok(tag);
        }
    }

    Err(SortError::Config(format!("unknown tag name {:?}", name)))
}

fn keyword_tag(name: &str) -> Option<Tag> {
    let tag = match name {
        "PatientName" => tags::PATIENT_NAME,
        "PatientID" => tags::PATIENT_ID,
        "PatientBirthDate" => tags::PATIENT_BIRTH_DATE,
        "PatientSex" => tags::PATIENT_SEX,
        "PatientAge" => tags::PATIENT_AGE,
        "PatientAddress" => tags::PATIENT_ADDRESS,
        "PatientComments" => tags::PATIENT_COMMENTS,
        "OtherPatientIDs" => tags::OTHER_PATIENT_I_DS,
        "OtherPatientNames" => tags::OTHER_PATIENT_NAMES,
        "EthnicGroup" => tags::ETHNIC_GROUP,
        "PatientTelephoneNumbers" => tags::PATIENT_TELEPHONE_NUMBERS,
        "AccessionNumber" => tags::ACCESSION_NUMBER,
        "InstitutionName" => tags::INSTITUTION_NAME,
        "InstitutionAddress" => tags::INSTITUTION_ADDRESS,
        "InstitutionalDepartmentName" => tags::INSTITUTIONAL_DEPARTMENT_NAME,
        "ReferringPhysicianName" => tags::REFERRING_PHYSICIAN_NAME,
        "RequestingPhysician" => tags::REQUESTING_PHYSICIAN,
        "PerformingPhysicianName" => tags::PERFORMING_PHYSICIAN_NAME,
        "OperatorsName" => tags::OPERATORS_NAME,
        "StationName" => tags::STATION_NAME,
        "StudyID" => tags::STUDY_ID,
        "StudyDate" => tags::STUDY_DATE,
        "StudyTime" => tags::STUDY_TIME,
        "StudyDescription" => tags::STUDY_DESCRIPTION,
        "StudyComments" => tags::STUDY_COMMENTS,
        "SeriesDescription" => tags::SERIES_DESCRIPTION,
        "BodyPartExamined" => tags::BODY_PART_EXAMINED,
        "ProtocolName" => tags::PROTOCOL_NAME,
        "DeviceSerialNumber" => tags::DEVICE_SERIAL_NUMBER,
        "Manufacturer" => tags::MANUFACTURER,
        "ManufacturerModelName" => tags::MANUFACTURER_MODEL_NAME,
        "SoftwareVersions" => tags::SOFTWARE_VERSIONS,
        "PixelData" => tags::PIXEL_DATA,
        _ => return None,
    };
    Some(tag)
}
