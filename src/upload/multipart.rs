//! Reading uploaded files out of a multipart request body.

use crate::error::{AppError, AppResult};
use actix_multipart::{Field, Multipart};
use futures_util::stream::StreamExt;

/// One uploaded file, held in memory until it is staged.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// Set when the body exceeded the size limit; `bytes` is then incomplete
    pub too_large: bool,
}

impl UploadedFile {
    /// Whether the declared MIME type starts with `prefix` (e.g. `"audio/"`).
    pub fn has_mime_prefix(&self, prefix: &str) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().starts_with(prefix))
            .unwrap_or(false)
    }
}

fn field_name(field: &Field) -> Option<String> {
    field
        .content_disposition()
        .and_then(|cd| cd.get_name())
        .map(|name| name.to_string())
}

/// Drain a field we are not interested in.
async fn skip_field(field: &mut Field) -> AppResult<()> {
    while let Some(chunk) = field.next().await {
        chunk?;
    }
    Ok(())
}

/// Read a field's body, keeping at most `max_bytes`.
async fn read_field(mut field: Field, max_bytes: usize) -> AppResult<UploadedFile> {
    let filename = field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .map(|s| s.to_string());
    let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

    let mut bytes = Vec::new();
    let mut too_large = false;
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if too_large {
            continue;
        }
        if bytes.len() + chunk.len() > max_bytes {
            too_large = true;
            bytes.clear();
            continue;
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(UploadedFile {
        filename,
        content_type,
        bytes,
        too_large,
    })
}

/// First file sent under `name`. Remaining parts are left unread.
pub async fn read_single(payload: &mut Multipart, name: &str, max_bytes: usize) -> AppResult<UploadedFile> {
    while let Some(item) = payload.next().await {
        let mut field = item?;
        if field_name(&field).as_deref() == Some(name) {
            return read_field(field, max_bytes).await;
        }
        skip_field(&mut field).await?;
    }

    Err(AppError::Validation(format!("No file provided in form field '{}'", name)))
}

/// Every file sent under `name`, in order. Rejects as soon as more than
/// `max_files` are seen, before anything has been analyzed.
pub async fn read_batch(
    payload: &mut Multipart,
    name: &str,
    max_files: usize,
    max_bytes: usize,
) -> AppResult<Vec<UploadedFile>> {
    let mut files = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field = item?;
        if field_name(&field).as_deref() != Some(name) {
            skip_field(&mut field).await?;
            continue;
        }

        if files.len() == max_files {
            return Err(AppError::Validation(format!(
                "Too many files. Maximum {} images per batch.",
                max_files
            )));
        }
        files.push(read_field(field, max_bytes).await?);
    }

    if files.is_empty() {
        return Err(AppError::Validation(format!("No files provided in form field '{}'", name)));
    }

    Ok(files)
}
