//! Persistence of profile sets.
//!
//! Three interchangeable formats: partitioned parquet folders, a single
//! zip container with parquet sub-tables, and a JSON folder tree. All
//! loaders verify file existence and readability before reading.

pub mod container;
pub mod json;
pub mod parquet;

use std::fs::File;
use std::path::Path;

use sbx_core::{SbxError, SbxResult};

/// Fail with an `Io` error if `file` is missing, not a file, or unreadable.
pub(crate) fn check_file_existence(file: &Path) -> SbxResult<File> {
    if !file.exists() {
        return Err(SbxError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("file {} does not exist", file.display()),
        )));
    }
    if !file.is_file() {
        return Err(SbxError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a file", file.display()),
        )));
    }
    File::open(file).map_err(SbxError::Io)
}
