//! Checks applied to an upload before anything is stored.

use std::path::Path;

use uuid::Uuid;

use super::error::UploadError;
use crate::directory::{SubjectDirectory, SubjectRecord};

/// Lowercased extension of `file_name` including the dot, or `""`.
pub fn file_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn validate_format(file_name: &str, allowed: &[String]) -> Result<(), UploadError> {
    let extension = file_extension(file_name);
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
        Ok(())
    } else {
        Err(UploadError::UnsupportedFormat {
            extension,
            allowed: allowed.to_vec(),
        })
    }
}

pub fn validate_size(size: u64, max: u64) -> Result<(), UploadError> {
    if size > max {
        return Err(UploadError::TooLarge { size, max });
    }
    Ok(())
}

pub fn parse_reference(raw: &str) -> Result<Uuid, UploadError> {
    Uuid::parse_str(raw.trim()).map_err(|_| UploadError::InvalidReferenceFormat(raw.to_string()))
}

/// Resolves a subject reference. A directory failure is never reported as
/// "not found".
pub fn resolve_subject(
    directory: &dyn SubjectDirectory,
    reference: &Uuid,
) -> Result<SubjectRecord, UploadError> {
    match directory.get_by_reference(reference) {
        Ok(Some(record)) => Ok(record),
        Ok(None) => {
            log::warn!("Subject with reference {} not found", reference);
            Err(UploadError::ReferenceNotFound(*reference))
        }
        Err(e) => Err(UploadError::DirectoryUnavailable(e.to_string())),
    }
}
