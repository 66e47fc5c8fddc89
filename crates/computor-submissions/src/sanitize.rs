//! Archive/filename path sanitization, ported from the original
//! `_sanitize_archive_path` / `_sanitize_path_segment` (original_source).
//! Full ZIP extraction is out of scope, but the outer filename still goes through
//! this sanitizer before it touches an object key or a log line.

use computor_core::ApiError;

/// Rejects absolute paths and `..` traversal segments.
pub fn sanitize_archive_path(path: &str) -> Result<String, ApiError> {
    if path.is_empty() {
        return Err(ApiError::validation("filename must not be empty"));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(ApiError::validation("filename must not be an absolute path"));
    }
    if path.contains("..") {
        return Err(ApiError::validation("filename must not contain '..' traversal"));
    }
    if path.contains('\0') {
        return Err(ApiError::validation("filename must not contain NUL bytes"));
    }
    Ok(path.to_string())
}

pub fn require_zip_extension(filename: &str) -> Result<(), ApiError> {
    if !filename.to_ascii_lowercase().ends_with(".zip") {
        return Err(ApiError::validation("uploaded file must be a .zip archive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_absolute_paths() {
        assert!(sanitize_archive_path("/etc/passwd").is_err());
        assert!(sanitize_archive_path("\\\\server\\share").is_err());
    }

    #[test]
    fn rejects_traversal() {
        assert!(sanitize_archive_path("../../etc/passwd").is_err());
        assert!(sanitize_archive_path("a/../b").is_err());
    }

    #[test]
    fn accepts_plain_relative_filenames() {
        assert_eq!(sanitize_archive_path("submission.zip").unwrap(), "submission.zip");
    }

    #[test]
    fn extension_check() {
        assert!(require_zip_extension("a.zip").is_ok());
        assert!(require_zip_extension("a.ZIP").is_ok());
        assert!(require_zip_extension("a.tar.gz").is_err());
    }
}
