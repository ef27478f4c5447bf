//! CLI-facing output formatting

pub mod report;

pub use report::TextReport;
