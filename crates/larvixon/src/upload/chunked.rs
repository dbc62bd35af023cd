//! Resumable uploads: clients send a file in ranged chunks, which are
//! appended to a staging file and handed to the coordinator once complete.

use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::coordinator::{Owner, UploadCoordinator, UploadFile};
use super::error::UploadError;
use super::validation::validate_format;
use crate::analysis::Analysis;

const MAX_UPLOAD_ID_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Invalid upload id '{0}'")]
    InvalidUploadId(String),

    #[error("Invalid filename '{0}'")]
    InvalidFilename(String),

    #[error("Invalid Content-Range '{0}'")]
    InvalidContentRange(String),

    #[error(transparent)]
    TooLarge(UploadError),

    #[error("Failed to write staging file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Parsed `Content-Range: bytes <first>-<last>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Inclusive byte range of this chunk; `None` for `*`.
    pub range: Option<(u64, u64)>,
    /// Declared total size; `None` when the client sent `*`.
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(header: &str) -> Result<Self, ChunkError> {
        let invalid = || ChunkError::InvalidContentRange(header.to_string());

        let spec = header.trim().strip_prefix("bytes").ok_or_else(invalid)?.trim_start();
        let (range, total) = spec.split_once('/').ok_or_else(invalid)?;

        let range = match range.trim() {
            "*" => None,
            r => {
                let (first, last) = r.split_once('-').ok_or_else(invalid)?;
                let first: u64 = first.trim().parse().map_err(|_| invalid())?;
                let last: u64 = last.trim().parse().map_err(|_| invalid())?;
                if last < first {
                    return Err(invalid());
                }
                Some((first, last))
            }
        };
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse::<u64>().map_err(|_| invalid())?),
        };
        if let (Some((_, last)), Some(total)) = (range, total) {
            if last >= total {
                return Err(invalid());
            }
        }

        Ok(Self { range, total })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    /// More chunks expected.
    Partial { received: u64 },
    /// All declared bytes are staged at this path.
    Complete(PathBuf),
}

/// Appends chunks under a staging directory.
pub struct ChunkedUploadStager {
    staging_dir: PathBuf,
    max_file_size: u64,
}

impl ChunkedUploadStager {
    pub fn new<P: Into<PathBuf>>(staging_dir: P, max_file_size: u64) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            max_file_size,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Staging location for an upload: `<staging>/<upload_id>_<filename>`.
    pub fn staging_path(&self, upload_id: &str, filename: &str) -> Result<PathBuf, ChunkError> {
        validate_upload_id(upload_id)?;
        let name = final_component(filename)?;
        Ok(self.staging_dir.join(format!("{}_{}", upload_id, name)))
    }

    /// Appends one chunk and reports whether the upload is complete.
    pub fn append_chunk(
        &self,
        upload_id: &str,
        filename: &str,
        chunk: &mut dyn Read,
        content_range: Option<&str>,
    ) -> Result<ChunkStatus, ChunkError> {
        let path = self.staging_path(upload_id, filename)?;
        let range = content_range.map(ContentRange::parse).transpose()?;

        fs::create_dir_all(&self.staging_dir).map_err(|e| ChunkError::Io {
            path: self.staging_dir.clone(),
            source: e,
        })?;
        let io_err = |e: io::Error| ChunkError::Io {
            path: path.clone(),
            source: e,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        io::copy(chunk, &mut file).map_err(io_err)?;
        let received = file.metadata().map_err(io_err)?.len();
        drop(file);

        let Some(total) = range.and_then(|r| r.total) else {
            return Ok(ChunkStatus::Partial { received });
        };

        if total > self.max_file_size {
            remove_staged(&path);
            return Err(ChunkError::TooLarge(UploadError::TooLarge {
                size: total,
                max: self.max_file_size,
            }));
        }

        if received >= total {
            log::debug!("Upload {} fully staged ({} bytes)", upload_id, received);
            Ok(ChunkStatus::Complete(path))
        } else {
            Ok(ChunkStatus::Partial { received })
        }
    }

    /// Runs a fully staged upload through the coordinator. The staging
    /// file is removed whatever the outcome.
    pub fn finalize(
        &self,
        coordinator: &UploadCoordinator,
        staged: &Path,
        filename: &str,
        description: &str,
        subject_ref: Option<&str>,
        owner: &dyn Owner,
    ) -> Result<Analysis, ChunkError> {
        let name = final_component(filename)?;

        if let Err(e) = validate_format(name, coordinator.allowed_extensions()) {
            log::warn!("File format validation failed: {}", e);
            remove_staged(staged);
            return Err(e.into());
        }

        let result = UploadFile::open(staged, name)
            .map_err(|e| ChunkError::Io {
                path: staged.to_path_buf(),
                source: e,
            })
            .and_then(|file| {
                coordinator
                    .upload(Some(file), description, subject_ref, owner)
                    .map_err(ChunkError::from)
            });

        if let Err(e) = &result {
            log::error!("Error saving chunked upload: {}", e);
        }
        remove_staged(staged);
        result
    }
}

fn validate_upload_id(upload_id: &str) -> Result<(), ChunkError> {
    let valid = !upload_id.is_empty()
        && upload_id.len() <= MAX_UPLOAD_ID_LEN
        && upload_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ChunkError::InvalidUploadId(upload_id.to_string()))
    }
}

fn final_component(filename: &str) -> Result<&str, ChunkError> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ChunkError::InvalidFilename(filename.to_string()));
    }
    Ok(name)
}

fn remove_staged(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("Failed to remove staging file {}: {}", path.display(), e);
        }
    }
}
