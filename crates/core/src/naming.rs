//! Upload file naming and storage path conventions.
//!
//! Uploaded originals are stored as `{task_id}_{filename}`; restored images
//! are always written as lossless `{task_id}.png`.

use crate::error::CoreError;
use crate::types::TaskId;

/// Image formats the service can decode.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Extension of every processed output.
pub const PROCESSED_EXTENSION: &str = "png";

/// Maximum length of a stored filename (before the task id prefix).
pub const MAX_FILENAME_LEN: usize = 200;

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped (both `/` and `\` separators), control
/// characters are removed and leading dots are stripped so the result can
/// never escape the upload directory or become a hidden file.
///
/// # Examples
///
/// ```
/// use relaize_core::naming::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
/// assert_eq!(sanitize_filename("C:\\photos\\reef.JPG").unwrap(), "reef.JPG");
/// ```
pub fn sanitize_filename(raw: &str) -> Result<String, CoreError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();

    if cleaned.is_empty() {
        return Err(CoreError::Validation("Filename is required".to_string()));
    }
    if cleaned.len() > MAX_FILENAME_LEN {
        return Err(CoreError::Validation(format!(
            "Filename too long: {} chars (max {MAX_FILENAME_LEN})",
            cleaned.len()
        )));
    }
    Ok(cleaned)
}

/// Lowercased extension of `filename`, if any.
pub fn extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Reject filenames whose extension the image decoder does not support.
pub fn validate_image_extension(filename: &str) -> Result<(), CoreError> {
    match extension(filename) {
        Some(ext) if SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(CoreError::Validation(format!(
            "Unsupported image format '.{ext}'. Supported: {}",
            SUPPORTED_IMAGE_EXTENSIONS
                .iter()
                .map(|e| format!(".{e}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))),
        None => Err(CoreError::Validation(format!(
            "Filename '{filename}' has no extension"
        ))),
    }
}

/// Stored name of an uploaded original.
pub fn source_file_name(id: TaskId, filename: &str) -> String {
    format!("{id}_{filename}")
}

/// Stored name of a restored output.
pub fn processed_file_name(id: TaskId) -> String {
    format!("{id}.{PROCESSED_EXTENSION}")
}

/// MIME type for a stored image, by extension.
pub fn content_type_for(filename: &str) -> &'static str {
    match extension(filename).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
