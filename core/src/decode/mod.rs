//! DICOM header decoding
//!
//! Leaf stage of the pipeline: turns a file path into an in-memory DICOM
//! object and a [`DicomRecord`](crate::types::DicomRecord) header snapshot.
//! Source files are opened read-only and never mutated.

pub mod tags;

use crate::error::{Result, SortError};
use dicom_object::{open_file, FileDicomObject, InMemDicomObject};
use log::info;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Opens a DICOM file for decoding
///
/// The DICM magic probe runs first so that arbitrary non-DICOM files fail
/// with a clear message instead of a parser error deep in the header.
/// Truncated headers and unsupported transfer syntaxes surface as
/// [`SortError::Decode`] from the underlying reader.
pub fn open(path: &Path) -> Result<FileDicomObject<InMemDicomObject>> {
    if !is_dicom_file(path) {
        return Err(SortError::Decode(format!(
            "{}: not a DICOM file (missing DICM magic)",
            path.display()
        )));
    }
    Ok(open_file(path)?)
}

/// Checks if a file has a DICOM header
///
/// DICOM files have a 128-byte preamble followed by the 4-byte "DICM"
/// magic string at offset 128.
pub fn is_dicom_file(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    // Read first 132 bytes (128-byte preamble + 4-byte "DICM" magic)
    let mut buffer = [0u8; 132];
    match file.read(&mut buffer) {
        Ok(n) if n >= 132 => &buffer[128..132] == b"DICM",
        _ => false,
    }
}

/// Collects candidate input files from a directory
///
/// Files with a `.dcm`/`.dicom` extension are accepted directly; extensionless
/// files are probed for the DICM magic. With `recursive` set, subdirectories
/// are walked depth-first.
pub fn collect_input_files(directory: &Path, recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_into(directory, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_into(directory: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            if recursive {
                collect_into(&path, recursive, files)?;
            }
        } else if path.is_file() {
            if let Some(ext) = path.extension() {
                if ext.eq_ignore_ascii_case("dcm") || ext.eq_ignore_ascii_case("dicom") {
                    files.push(path);
                }
            } else if is_dicom_file(&path) {
                info!("Found headerless DICOM file: {}", path.display());
                files.push(path);
            }
        }
    }
    Ok(())
}
