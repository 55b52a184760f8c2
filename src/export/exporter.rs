use crate::render::RenderedDocument;
use anyhow::{Context, Result};
use log::info;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ExportError {
    ExportDirNotFound(PathBuf),
    NameExhausted(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::ExportDirNotFound(dir) => {
                write!(f, "Export directory not found: {}", dir.display())
            }
            ExportError::NameExhausted(name) => {
                write!(f, "No free file name left for {}", name)
            }
        }
    }
}

impl std::error::Error for ExportError {}

/// Writes finished documents to disk
pub struct DocumentExporter;

impl DocumentExporter {
    const MAX_SUFFIX: u32 = 999;

    /// Save `document` into `export_dir` under its generated name.
    ///
    /// Two exports within the same second get `-1`, `-2`, ... suffixes
    /// instead of overwriting each other.
    pub fn save(document: &RenderedDocument, export_dir: &Path) -> Result<PathBuf> {
        if !export_dir.is_dir() {
            return Err(ExportError::ExportDirNotFound(export_dir.to_path_buf()).into());
        }

        let (path, mut file) = Self::create_free(export_dir, &document.file_name)?;
        file.write_all(&document.bytes)
            .and_then(|()| file.sync_all())
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(
            "Saved {} ({} of {} slots filled)",
            path.display(),
            document.summary.placed,
            document.summary.slots
        );
        Ok(path)
    }

    /// Create the first name in `file_name`, `stem-1.ext`, `stem-2.ext`, ...
    /// that does not exist yet. Creation is exclusive, so a concurrent
    /// export can never open the same file.
    fn create_free(dir: &Path, file_name: &str) -> Result<(PathBuf, File)> {
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{ext}")),
            None => (file_name, String::new()),
        };
        for n in 0..=Self::MAX_SUFFIX {
            let candidate = if n == 0 {
                dir.join(file_name)
            } else {
                dir.join(format!("{stem}-{n}{ext}"))
            };
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create {}", candidate.display()));
                }
            }
        }
        Err(ExportError::NameExhausted(file_name.to_string()).into())
    }
}
