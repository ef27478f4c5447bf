use crate::error::{Result, SortError};
use crate::types::DicomRecord;
use regex::Regex;
use std::path::PathBuf;

/// Template applied when the manifest does not name one
pub const DEFAULT_TEMPLATE: &str = "{category}/{study_uid}/{filename}";

const KNOWN_PLACEHOLDERS: &[&str] = &[
    "category",
    "study_uid",
    "series_uid",
    "sop_uid",
    "instance_number",
    "modality",
    "patient",
    "filename",
];

/// Output naming template
///
/// Renders a relative destination path from a classified record. Placeholders
/// are written `{name}`; path separators in the template delimit output
/// directories. Values are sanitized so that header content can never escape
/// the destination root.
///
/// # Example
///
/// ```
/// use dicomsort_core::sort::NamingTemplate;
///
/// let template = NamingTemplate::new("{category}/{study_uid}/{filename}").unwrap();
///
/// // Unknown placeholders are a configuration error
/// assert!(NamingTemplate::new("{categorie}/{filename}").is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NamingTemplate {
    template: String,
}

impl NamingTemplate {
    /// Parses and validates a template string
    ///
    /// # Errors
    ///
    /// Returns [`SortError::Config`] if the template is empty or names an
    /// unknown placeholder.
    pub fn new(template: &str) -> Result<Self> {
        if template.trim().is_empty() {
            return Err(SortError::Config("naming template is empty".to_string()));
        }

        let placeholder = Regex::new(r"\{([^{}]*)\}").expect("placeholder pattern is valid");
        for cap in placeholder.captures_iter(template) {
            let name = &cap[1];
            if !KNOWN_PLACEHOLDERS.contains(&name) {
                return Err(SortError::Config(format!(
                    "unknown template placeholder {{{}}}",
                    name
                )));
            }
        }

        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Renders the relative destination path for one record
    ///
    /// `patient_label` substitutes `{patient}` when the de-identifier has
    /// produced a pseudonym; otherwise the record's own identifier is used.
    /// Values that are absent from the header render as `unknown`.
    pub fn render(
        &self,
        category: &str,
        record: &DicomRecord,
        patient_label: Option<&str>,
    ) -> PathBuf {
        let filename = record
            .source
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        let instance = record.instance_number.map(|n| format!("{:04}", n));
        let patient = patient_label
            .map(|s| s.to_string())
            .or_else(|| record.patient_identifier().map(|s| s.to_string()));

        let mut rendered = self.template.clone();
        for (name, value) in [
            ("{category}", Some(category.to_string())),
            ("{study_uid}", record.study_instance_uid.clone()),
            ("{series_uid}", record.series_instance_uid.clone()),
            ("{sop_uid}", record.sop_instance_uid.clone()),
            ("{instance_number}", instance),
            ("{modality}", record.modality.clone()),
            ("{patient}", patient),
            ("{filename}", filename),
        ] {
            if rendered.contains(name) {
                let value = sanitize(value.as_deref().unwrap_or("unknown"));
                rendered = rendered.replace(name, &value);
            }
        }

        PathBuf::from(rendered)
    }
}

impl Default for NamingTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Replaces characters that are unsafe in a path component
///
/// UID dots are preserved; everything outside `[A-Za-z0-9._-]` and spaces
/// becomes an underscore. Spaces are kept as-is so human-readable series
/// descriptions stay legible.
fn sanitize(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim().to_string();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn record(study_uid: Option<&str>, instance: Option<i32>) -> DicomRecord {
        DicomRecord {
            source: PathBuf::from("/in/scan 01.dcm"),
            patient_id: Some("PAT001".to_string()),
            patient_name: None,
            study_instance_uid: study_uid.map(|s| s.to_string()),
            series_instance_uid: Some("1.2.3.4.5".to_string()),
            sop_instance_uid: Some("1.2.3.4.5.6".to_string()),
            series_description: Some("T1 MPRAGE".to_string()),
            study_description: None,
            modality: Some("MR".to_string()),
            body_part_examined: None,
            instance_number: instance,
            number_of_frames: 1,
        }
    }

    #[test]
    fn test_render_default_template() {
        let template = NamingTemplate::default();
        let path = template.render("anatomical", &record(Some("1.2.3"), Some(7)), None);
        assert_eq!(path, Path::new("anatomical/1.2.3/scan 01.dcm"));
    }

    #[test]
    fn test_render_missing_values_become_unknown() {
        let template = NamingTemplate::default();
        let path = template.render("anatomical", &record(None, None), None);
        assert_eq!(path, Path::new("anatomical/unknown/scan 01.dcm"));
    }

    #[test]
    fn test_render_instance_number_zero_padded() {
        let template = NamingTemplate::new("{category}/{instance_number}.dcm").unwrap();
        let path = template.render("cat", &record(None, Some(7)), None);
        assert_eq!(path, Path::new("cat/0007.dcm"));
    }

    #[test]
    fn test_render_patient_label_overrides_header() {
        let template = NamingTemplate::new("{patient}/{filename}").unwrap();
        let path = template.render("cat", &record(None, None), Some("anon_ab12cd34ef56"));
        assert_eq!(path, Path::new("anon_ab12cd34ef56/scan 01.dcm"));
    }

    #[test]
    fn test_sanitize_blocks_path_escapes() {
        let template = NamingTemplate::new("{category}/{study_uid}").unwrap();
        let mut rec = record(Some("../../etc"), None);
        rec.study_instance_uid = Some("../../etc".to_string());
        let path = template.render("cat", &rec, None);
        // dots survive but separators do not
        assert_eq!(path, Path::new("cat/.._.._etc"));
    }

    #[test]
    fn test_unknown_placeholder_is_config_error() {
        let err = NamingTemplate::new("{category}/{nope}").unwrap_err();
        assert!(matches!(err, SortError::Config(_)));
    }

    #[test]
    fn test_empty_template_is_config_error() {
        assert!(matches!(
            NamingTemplate::new("  "),
            Err(SortError::Config(_))
        ));
    }
}
