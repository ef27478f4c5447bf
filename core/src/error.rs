use std::path::PathBuf;
use thiserror::Error;

/// Result type for dicomsort operations
pub type Result<T> = std::result::Result<T, SortError>;

/// Error types for dicomsort operations
///
/// `Config` errors are fatal at startup; the remaining variants are raised
/// per file and collected by the pipeline without aborting the batch.
#[derive(Error, Debug)]
pub enum SortError {
    /// The file could not be parsed as DICOM
    #[error("decode error: {0}")]
    Decode(String),

    /// No classification rule matched in strict mode
    #[error("no classification rule matched: {0}")]
    Unclassified(String),

    /// A required de-identification action could not be performed
    #[error("de-identification policy violation: {0}")]
    PolicyViolation(String),

    /// Output file could not be written
    #[error("write error for {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    /// Malformed manifest or policy document
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SortError {
    /// Builds a `Write` error for a destination path from any displayable cause
    pub fn write<E: std::fmt::Display>(path: &std::path::Path, cause: E) -> Self {
        SortError::Write {
            path: path.to_path_buf(),
            reason: cause.to_string(),
        }
    }
}

// Convert dicom-object errors
impl From<dicom_object::ReadError> for SortError {
    fn from(e: dicom_object::ReadError) -> Self {
        SortError::Decode(format!("{}", e))
    }
}

impl From<dicom_core::value::ConvertValueError> for SortError {
    fn from(e: dicom_core::value::ConvertValueError) -> Self {
        SortError::Decode(format!("{}", e))
    }
}

// Malformed JSON in a manifest or policy document
impl From<serde_json::Error> for SortError {
    fn from(e: serde_json::Error) -> Self {
        SortError::Config(format!("{}", e))
    }
}
