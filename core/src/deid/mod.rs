//! De-identification
//!
//! Applies a [`DeidPolicy`] to a decoded dataset in place. Pseudonyms and
//! remapped UIDs are salted hashes of the original values, so every file of
//! one patient/study/series agrees without any shared mapping state, and
//! reruns with the same salt are reproducible.

pub mod policy;

pub use policy::{DeidPolicy, PolicySpec, TagAction};

use crate::decode::tags::{
    get_string_value, PATIENT_ID, PATIENT_NAME, PIXEL_DATA, SERIES_INSTANCE_UID, SOP_INSTANCE_UID,
    STUDY_INSTANCE_UID,
};
use crate::error::{Result, SortError};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_object::InMemDicomObject;
use xxhash_rust::xxh3::{xxh3_128, xxh3_64};

const UID_TAGS: [Tag; 3] = [STUDY_INSTANCE_UID, SERIES_INSTANCE_UID, SOP_INSTANCE_UID];

/// What the de-identifier produced for one file
#[derive(Debug, Clone, PartialEq)]
pub struct DeidOutcome {
    /// Original patient identifier and its pseudonym, when the header had one
    pub pseudonym: Option<(String, String)>,

    /// Remapped SOP Instance UID, to be propagated into the file meta group
    pub sop_instance_uid: Option<String>,
}

/// Derives a repeatable pseudonym from an identifier
///
/// `anon_` plus the first 12 hex digits of xxh3-128 over value + salt.
pub fn pseudonym(value: &str, salt: &str) -> String {
    let digest = xxh3_128(format!("{}{}", value, salt).as_bytes());
    format!("anon_{}", &format!("{:032x}", digest)[..12])
}

/// Derives a replacement UID from an original UID
///
/// Deterministic for a fixed salt, which keeps Study and Series UIDs
/// consistent across all files of a run without a shared table.
pub fn remap_uid(uid_root: &str, original: &str, salt: &str) -> String {
    let digest = xxh3_64(format!("{}{}", original, salt).as_bytes());
    format!("{}.{}", uid_root.trim_end_matches('.'), digest)
}

/// Applies a de-identification policy to a dataset in place
///
/// Explicit tag actions run first, then the catch-all over unlisted tags,
/// then UID remapping. Unknown tags pass through unchanged unless the
/// catch-all is set. Pixel data is never touched by the catch-all; an
/// explicit mutating action on pixel data or on a sequence element is a
/// [`SortError::PolicyViolation`] — surfaced, never silently dropped.
pub fn apply_policy(dcm: &mut InMemDicomObject, policy: &DeidPolicy) -> Result<DeidOutcome> {
    let original_id =
        get_string_value(dcm, PATIENT_ID).or_else(|| get_string_value(dcm, PATIENT_NAME));

    for (tag, action) in policy.actions() {
        apply_action(dcm, *tag, action, policy.salt())?;
    }

    if let Some(catch_all) = policy.catch_all() {
        let unlisted: Vec<Tag> = dcm
            .iter()
            .map(|elem| elem.header().tag)
            .filter(|tag| {
                !policy.has_action(*tag)
                    && *tag != PIXEL_DATA
                    && !(policy.remap_uids() && UID_TAGS.contains(tag))
            })
            .collect();
        for tag in unlisted {
            apply_action(dcm, tag, catch_all, policy.salt())?;
        }
    }

    let mut new_sop = None;
    if policy.remap_uids() {
        for tag in UID_TAGS {
            if let Some(original) = get_string_value(dcm, tag) {
                let remapped = remap_uid(policy.uid_root(), &original, policy.salt());
                dcm.put(DataElement::new(
                    tag,
                    VR::UI,
                    PrimitiveValue::from(remapped.as_str()),
                ));
                if tag == SOP_INSTANCE_UID {
                    new_sop = Some(remapped);
                }
            }
        }
    }

    let pseud = original_id
        .as_ref()
        .map(|id| (id.clone(), pseudonym(id, policy.salt())));
    Ok(DeidOutcome {
        pseudonym: pseud,
        sop_instance_uid: new_sop,
    })
}

fn apply_action(
    dcm: &mut InMemDicomObject,
    tag: Tag,
    action: &TagAction,
    salt: &str,
) -> Result<()> {
    if matches!(action, TagAction::Keep) {
        return Ok(());
    }

    // Absent tags have nothing to act on
    let payload = match dcm.element(tag) {
        Err(_) => return Ok(()),
        Ok(elem) => {
            let vr = elem.vr();
            if tag == PIXEL_DATA || vr == VR::SQ {
                return Err(SortError::PolicyViolation(format!(
                    "cannot safely transform {} ({:?} action on {})",
                    tag,
                    action,
                    if tag == PIXEL_DATA {
                        "pixel data"
                    } else {
                        "a sequence"
                    }
                )));
            }
            (vr, elem.to_str().ok().map(|s| s.to_string()))
        }
    };
    let (vr, text) = payload;

    match action {
        TagAction::Keep => {}
        TagAction::Remove => {
            dcm.remove_element(tag);
            if dcm.element(tag).is_ok() {
                return Err(SortError::PolicyViolation(format!(
                    "tag {} still present after removal",
                    tag
                )));
            }
        }
        TagAction::Blank => {
            dcm.put(DataElement::new(tag, vr, PrimitiveValue::Empty));
        }
        TagAction::Hash => {
            let Some(text) = text else {
                return Err(SortError::PolicyViolation(format!(
                    "tag {} has a non-textual value and cannot be hashed",
                    tag
                )));
            };
            dcm.put(DataElement::new(
                tag,
                vr,
                PrimitiveValue::from(pseudonym(&text, salt).as_str()),
            ));
        }
        TagAction::Replace(value) => {
            dcm.put(DataElement::new(tag, vr, PrimitiveValue::from(value.as_str())));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_dictionary_std::tags;

    fn test_object() -> InMemDicomObject {
        let mut dcm = InMemDicomObject::new_empty();
        dcm.put(DataElement::new(
            PATIENT_ID,
            VR::LO,
            PrimitiveValue::from("PAT001"),
        ));
        dcm.put(DataElement::new(
            PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from("Doe^Jane"),
        ));
        dcm.put(DataElement::new(
            tags::PATIENT_BIRTH_DATE,
            VR::DA,
            PrimitiveValue::from("19800101"),
        ));
        dcm.put(DataElement::new(
            tags::INSTITUTION_NAME,
            VR::LO,
            PrimitiveValue::from("General Hospital"),
        ));
        dcm.put(DataElement::new(
            tags::SERIES_DESCRIPTION,
            VR::LO,
            PrimitiveValue::from("T1 MPRAGE"),
        ));
        dcm.put(DataElement::new(
            STUDY_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3.4"),
        ));
        dcm.put(DataElement::new(
            SERIES_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3.4.5"),
        ));
        dcm.put(DataElement::new(
            SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3.4.5.6"),
        ));
        dcm
    }

    #[test]
    fn test_pseudonym_shape_and_determinism() {
        let a = pseudonym("PAT001", "anon");
        let b = pseudonym("PAT001", "anon");
        let c = pseudonym("PAT001", "other-salt");

        assert!(a.starts_with("anon_"));
        assert_eq!(a.len(), "anon_".len() + 12);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_remap_uid_deterministic_and_rooted() {
        let a = remap_uid("9999", "1.2.3.4", "anon");
        let b = remap_uid("9999", "1.2.3.4", "anon");
        assert_eq!(a, b);
        assert!(a.starts_with("9999."));
        assert_ne!(a, remap_uid("9999", "1.2.3.5", "anon"));
    }

    #[test]
    fn test_default_policy_pseudonymises_and_blanks() {
        let mut dcm = test_object();
        let policy = DeidPolicy::default_policy("anon");
        let outcome = apply_policy(&mut dcm, &policy).unwrap();

        // Patient ID hashed into a pseudonym
        let new_id = get_string_value(&dcm, PATIENT_ID).unwrap();
        assert!(new_id.starts_with("anon_"));
        assert_ne!(new_id, "PAT001");

        // Birth date blanked but the element kept
        assert!(dcm.element(tags::PATIENT_BIRTH_DATE).is_ok());
        assert_eq!(get_string_value(&dcm, tags::PATIENT_BIRTH_DATE), None);

        // Series description is not part of the policy and passes through
        assert_eq!(
            get_string_value(&dcm, tags::SERIES_DESCRIPTION).as_deref(),
            Some("T1 MPRAGE")
        );

        // Mapping entry keyed by the original identifier
        let (orig, pseud) = outcome.pseudonym.unwrap();
        assert_eq!(orig, "PAT001");
        assert_eq!(pseud, new_id);
    }

    #[test]
    fn test_remove_leaves_no_trace() {
        let mut dcm = test_object();
        let policy =
            DeidPolicy::from_json(r#"{ "tags": { "InstitutionName": "remove" } }"#).unwrap();
        apply_policy(&mut dcm, &policy).unwrap();

        assert!(dcm.element(tags::INSTITUTION_NAME).is_err());
    }

    #[test]
    fn test_replace_action() {
        let mut dcm = test_object();
        let policy = DeidPolicy::from_json(
            r#"{ "tags": { "InstitutionName": { "replace": "REDACTED" } } }"#,
        )
        .unwrap();
        apply_policy(&mut dcm, &policy).unwrap();

        assert_eq!(
            get_string_value(&dcm, tags::INSTITUTION_NAME).as_deref(),
            Some("REDACTED")
        );
    }

    #[test]
    fn test_uid_remapping_consistent_across_files() {
        let policy = DeidPolicy::default_policy("anon");

        let mut first = test_object();
        let mut second = test_object();
        // Different instances of the same study and series
        second.put(DataElement::new(
            SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from("1.2.3.4.5.7"),
        ));

        let out_a = apply_policy(&mut first, &policy).unwrap();
        let out_b = apply_policy(&mut second, &policy).unwrap();

        assert_eq!(
            get_string_value(&first, STUDY_INSTANCE_UID),
            get_string_value(&second, STUDY_INSTANCE_UID)
        );
        assert_eq!(
            get_string_value(&first, SERIES_INSTANCE_UID),
            get_string_value(&second, SERIES_INSTANCE_UID)
        );
        // Per-instance SOP UIDs stay distinct
        assert_ne!(out_a.sop_instance_uid, out_b.sop_instance_uid);
        assert_ne!(
            get_string_value(&first, STUDY_INSTANCE_UID).as_deref(),
            Some("1.2.3.4")
        );
    }

    #[test]
    fn test_pixel_data_action_is_policy_violation() {
        let mut dcm = test_object();
        dcm.put(DataElement::new(
            PIXEL_DATA,
            VR::OW,
            PrimitiveValue::from("notreallypixels"),
        ));
        let policy = DeidPolicy::from_json(r#"{ "tags": { "PixelData": "remove" } }"#).unwrap();

        let err = apply_policy(&mut dcm, &policy).unwrap_err();
        assert!(matches!(err, SortError::PolicyViolation(_)));
    }

    #[test]
    fn test_absent_tag_is_not_an_error() {
        let mut dcm = InMemDicomObject::new_empty();
        let policy = DeidPolicy::default_policy("anon");
        let outcome = apply_policy(&mut dcm, &policy).unwrap();
        assert_eq!(outcome.pseudonym, None);
        assert_eq!(outcome.sop_instance_uid, None);
    }

    #[test]
    fn test_catch_all_remove_spares_listed_and_uid_tags() {
        let mut dcm = test_object();
        let policy = DeidPolicy::from_json(
            r#"{ "tags": { "PatientID": "keep" }, "default": "remove" }"#,
        )
        .unwrap();
        apply_policy(&mut dcm, &policy).unwrap();

        assert_eq!(get_string_value(&dcm, PATIENT_ID).as_deref(), Some("PAT001"));
        assert!(dcm.element(tags::SERIES_DESCRIPTION).is_err());
        assert!(dcm.element(tags::INSTITUTION_NAME).is_err());
        // UID tags survive catch-all and are remapped instead
        assert!(get_string_value(&dcm, STUDY_INSTANCE_UID).is_some());
    }
}
