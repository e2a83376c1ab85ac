//! Bridge to the backend's CSV import/export calls.
//!
//! The backend reports parse outcomes as one status string: a
//! [`SUCCESS_PREFIX`] marks a staged buffer, anything else is error text.
//! That convention stops here; past this module an import is either a
//! [`StagedBuffer`] or a [`DriverError::ImportRejected`].

use crate::backend::Backend;
use crate::error::{DriverError, DriverResult};
use anyhow::Context;
use log::{debug, info};
use std::path::{Path, PathBuf};

pub const SUCCESS_PREFIX: &str = "success";

/// Token proving the backend holds a parsed buffer ready to commit.
#[derive(Debug)]
#[must_use = "a staged buffer does nothing until committed"]
pub struct StagedBuffer {
    status: String,
}

impl StagedBuffer {
    /// The backend's success status, e.g. `"success! 10x20"`.
    pub fn status(&self) -> &str {
        &self.status
    }
}

/// Splits a backend status string into a staged buffer or the error text.
pub fn interpret_parse_status(status: String) -> Result<StagedBuffer, String> {
    if status.starts_with(SUCCESS_PREFIX) {
        Ok(StagedBuffer { status })
    } else {
        Err(status)
    }
}

/// Asks the backend to parse and stage `text`.
pub fn parse<B: Backend>(backend: &mut B, text: &str) -> DriverResult<StagedBuffer> {
    let status = backend.parse_buffer(text);
    debug!("Parse status: {}", status);
    interpret_parse_status(status).map_err(DriverError::ImportRejected)
}

/// Commits a staged buffer into backend state.
pub async fn commit<B: Backend>(backend: &mut B, staged: StagedBuffer) -> DriverResult<()> {
    backend.commit_parsed_buffer().await?;
    debug!("Committed staged buffer ({})", staged.status());
    Ok(())
}

/// Reads a user-selected import file, refusing anything that is not a CSV file.
pub fn read_import_file(path: &Path) -> DriverResult<String> {
    if !path.is_file() {
        return Err(DriverError::UserInput(format!(
            "No file selected at '{}'.",
            path.display()
        )));
    }
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(DriverError::UserInput(format!(
            "Unsupported file type for '{}'. Please select a CSV file.",
            path.display()
        )));
    }
    std::fs::read_to_string(path).map_err(|source| DriverError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Receives exported text, e.g. by writing it to disk or offering a download.
pub trait FileSaver {
    fn save(&mut self, filename: &str, contents: &str) -> anyhow::Result<()>;
}

/// Saves exports as files under one directory.
#[derive(Debug, Clone)]
pub struct DiskFileSaver {
    dir: PathBuf,
}

impl DiskFileSaver {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl FileSaver for DiskFileSaver {
    fn save(&mut self, filename: &str, contents: &str) -> anyhow::Result<()> {
        let path = self.dir.join(filename);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write export to {}", path.display()))?;
        info!("State exported to {} ({} bytes)", path.display(), contents.len());
        Ok(())
    }
}

/// Pulls the full state as text and hands it to `saver`. Returns the text length.
pub async fn export<B: Backend, F: FileSaver>(
    backend: &mut B,
    saver: &mut F,
    filename: &str,
) -> DriverResult<usize> {
    let text = backend.serialize_to_text().await?;
    saver.save(filename, &text)?;
    Ok(text.len())
}
