//! Core data model for the sorting pipeline

mod record;
mod result;

pub use record::DicomRecord;
pub use result::{FileStatus, SortResult, Stage};
