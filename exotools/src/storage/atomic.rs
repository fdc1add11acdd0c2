//! Write-to-temp-then-rename file replacement.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{ExoError, ExoResult};

/// Replace `path` with `content`. Readers see either the old file or the
/// complete new one.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> ExoResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// Remove a file, treating an already missing file as success.
pub(crate) fn remove_if_exists(path: &Path) -> ExoResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ExoError::from(e)),
    }
}
