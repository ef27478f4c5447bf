use crate::error::{Result, SortError};
use crate::sort::{NamingTemplate, DEFAULT_TEMPLATE};
use crate::types::DicomRecord;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a rule pattern is compared against a tag value
///
/// All kinds compare case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Pattern appears anywhere in the value
    #[default]
    Substring,
    /// Pattern equals the whole value
    Exact,
    /// Pattern is a regular expression
    Regex,
}

/// Which decoded header field a rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    /// Series Description, the usual protocol heuristic
    #[default]
    SeriesDescription,
    StudyDescription,
    Modality,
    BodyPartExamined,
}

/// Behavior when no rule matches a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifyMode {
    /// Unmatched records go to the manifest's default category
    #[default]
    Lenient,
    /// Unmatched records fail with `Unclassified`
    Strict,
}

/// One rule as written in the manifest document
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    /// Pattern text, compared per `kind`
    #[serde(rename = "match")]
    pub pattern: String,

    /// Header field to inspect
    #[serde(default)]
    pub field: MatchField,

    /// Comparison kind
    #[serde(default)]
    pub kind: MatchKind,

    /// Category assigned on match
    pub category: String,
}

/// Top-level manifest document
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestSpec {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,

    #[serde(default = "default_category")]
    pub default_category: String,

    #[serde(default)]
    pub mode: ClassifyMode,

    #[serde(default = "default_template")]
    pub template: String,
}

fn default_category() -> String {
    "unsorted".to_string()
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

/// A compiled classification rule
///
/// Regex patterns are compiled once at manifest load; evaluation allocates
/// nothing beyond the lowercased candidate value.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub pattern: String,
    pub field: MatchField,
    pub kind: MatchKind,
    pub category: String,
    regex: Option<Regex>,
}

impl ClassificationRule {
    fn compile(spec: RuleSpec) -> Result<Self> {
        if spec.pattern.trim().is_empty() {
            return Err(SortError::Config(format!(
                "rule for category {:?} has an empty pattern",
                spec.category
            )));
        }
        if spec.category.trim().is_empty() {
            return Err(SortError::Config(format!(
                "rule with pattern {:?} has an empty category",
                spec.pattern
            )));
        }

        let regex = match spec.kind {
            MatchKind::Regex => Some(
                RegexBuilder::new(&spec.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        SortError::Config(format!("invalid rule pattern {:?}: {}", spec.pattern, e))
                    })?,
            ),
            _ => None,
        };

        Ok(Self {
            pattern: spec.pattern,
            field: spec.field,
            kind: spec.kind,
            category: spec.category,
            regex,
        })
    }

    /// Evaluates this rule against a record
    ///
    /// A missing header field never matches.
    pub fn matches(&self, record: &DicomRecord) -> bool {
        let value = match self.field {
            MatchField::SeriesDescription => record.series_description.as_deref(),
            MatchField::StudyDescription => record.study_description.as_deref(),
            MatchField::Modality => record.modality.as_deref(),
            MatchField::BodyPartExamined => record.body_part_examined.as_deref(),
        };
        let Some(value) = value else {
            return false;
        };

        match self.kind {
            MatchKind::Substring => value.to_lowercase().contains(&self.pattern.to_lowercase()),
            MatchKind::Exact => value.eq_ignore_ascii_case(&self.pattern),
            MatchKind::Regex => self
                .regex
                .as_ref()
                .expect("regex rules are compiled at load")
                .is_match(value),
        }
    }
}

/// The full ordered rule set plus output naming configuration
///
/// Loaded once from a JSON document and owned read-only for the lifetime of
/// a run; classification is deterministic for identical input given a fixed
/// manifest.
///
/// # Example
///
/// ```
/// use dicomsort_core::classify::Manifest;
///
/// let manifest = Manifest::from_json(
///     r#"{ "rules": [ { "match": "T1", "category": "anatomical" } ] }"#,
/// )
/// .unwrap();
///
/// assert_eq!(manifest.rules().len(), 1);
/// assert_eq!(manifest.default_category, "unsorted");
/// ```
#[derive(Debug, Clone)]
pub struct Manifest {
    rules: Vec<ClassificationRule>,
    pub default_category: String,
    pub mode: ClassifyMode,
    pub template: NamingTemplate,
}

impl Manifest {
    /// Loads and validates a manifest from a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`SortError::Config`] for unreadable files, malformed JSON,
    /// invalid regex patterns, empty patterns or categories, and unknown
    /// template placeholders. All of these are fatal before any file is
    /// processed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SortError::Config(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parses a manifest from a JSON string
    pub fn from_json(text: &str) -> Result<Self> {
        let spec: ManifestSpec = serde_json::from_str(text)?;
        Self::from_spec(spec)
    }

    /// Builds a manifest from an already-parsed spec
    pub fn from_spec(spec: ManifestSpec) -> Result<Self> {
        if spec.default_category.trim().is_empty() {
            return Err(SortError::Config("default_category is empty".to_string()));
        }

        let rules = spec
            .rules
            .into_iter()
            .map(ClassificationRule::compile)
            .collect::<Result<Vec<_>>>()?;
        let template = NamingTemplate::new(&spec.template)?;

        Ok(Self {
            rules,
            default_category: spec.default_category,
            mode: spec.mode,
            template,
        })
    }

    /// Rules in declared (evaluation) order
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Overrides the classify mode, e.g. from a CLI switch
    pub fn with_mode(mut self, mode: ClassifyMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for Manifest {
    /// A rule-less lenient manifest: everything lands in `unsorted`
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_category: default_category(),
            mode: ClassifyMode::Lenient,
            template: NamingTemplate::default(),
        }
    }
}
