//! Scoped temp files for uploads.
//!
//! A `StagedUpload` owns its file on disk: dropping it deletes the file, so
//! every exit path of a handler (success, model error, no face) cleans up
//! without explicit delete calls.

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    /// Write `bytes` to a new uniquely named file in `dir`.
    pub fn stage(bytes: &[u8], suffix: &str, dir: &Path) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("emotion_upload_")
            .suffix(suffix)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        tracing::debug!(path = %file.path().display(), bytes = bytes.len(), "Staged upload");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        tracing::trace!(path = %self.file.path().display(), "Removing staged upload");
    }
}

/// File suffix for a staged upload: the original extension when it looks
/// sane, otherwise `default` (which includes the dot).
pub fn suffix_for(filename: Option<&str>, default: &str) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| default.to_string())
}
