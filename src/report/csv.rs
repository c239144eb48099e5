//! Append-only CSV output.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SimError;

/// Writes a header once, then appends one line per call.
///
/// The file is reopened in append mode for every row, so rows are on disk as soon
/// as they are produced even if the run aborts later.
#[derive(Debug, Clone)]
pub struct CsvAppender {
    path: PathBuf,
}

impl CsvAppender {
    /// Create (truncating) `path` and write `header`.
    pub fn create(path: &Path, header: &str) -> Result<Self, SimError> {
        let mut file = File::create(path)?;
        writeln!(file, "{}", header)?;
        Ok(CsvAppender { path: path.to_path_buf() })
    }

    pub fn append_row(&mut self, row: &str) -> Result<(), SimError> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", row)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
