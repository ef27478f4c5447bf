pub mod classify;
pub mod cli;
pub mod decode;
pub mod deid;
pub mod error;
pub mod pipeline;
pub mod sort;
pub mod types;

pub use classify::{classify, ClassifyMode, Manifest};
pub use cli::report::TextReport;
pub use deid::{DeidPolicy, TagAction};
pub use error::{Result, SortError};
pub use pipeline::{BatchOptions, CancelToken, Pipeline, RunReport};
pub use types::{DicomRecord, FileStatus, SortResult, Stage};
