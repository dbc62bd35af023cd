use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::info_span;

use super::error::UploadError;
use super::validation::{parse_reference, resolve_subject, validate_format, validate_size};
use crate::analysis::Analysis;
use crate::config::UploadConfig;
use crate::db::analysis_repo::{self, NewAnalysis};
use crate::db::Database;
use crate::directory::SubjectDirectory;
use crate::sanitize::redact_path;
use crate::storage::{AssetManager, StoredAsset};
use crate::worker::{AnalysisJob, JobQueue};

/// Readable, rewindable upload content.
pub trait UploadSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> UploadSource for T {}

/// An incoming video file.
pub struct UploadFile {
    pub name: String,
    pub size: u64,
    content: Box<dyn UploadSource>,
}

impl UploadFile {
    pub fn new<S: UploadSource + 'static>(name: impl Into<String>, size: u64, content: S) -> Self {
        Self {
            name: name.into(),
            size,
            content: Box::new(content),
        }
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self::new(name, size, Cursor::new(bytes))
    }

    /// Opens a local file, reporting it under `name`.
    pub fn open(path: &Path, name: impl Into<String>) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self::new(name, size, file))
    }
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// The account an upload belongs to.
pub trait Owner {
    fn owner_id(&self) -> i64;

    /// Called once an upload is recorded; accounts that track first-time
    /// users clear the flag here.
    fn unmark_new_user(&self) {}
}

/// Owner known only by id.
#[derive(Debug, Clone, Copy)]
pub struct OwnerId(pub i64);

impl Owner for OwnerId {
    fn owner_id(&self) -> i64 {
        self.0
    }
}

/// Validates uploads, stores their assets, records the analysis and
/// queues it for processing.
pub struct UploadCoordinator {
    db: Database,
    assets: Arc<AssetManager>,
    directory: Arc<dyn SubjectDirectory>,
    queue: Arc<dyn JobQueue>,
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl UploadCoordinator {
    pub fn new(
        db: Database,
        assets: Arc<AssetManager>,
        directory: Arc<dyn SubjectDirectory>,
        queue: Arc<dyn JobQueue>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            db,
            assets,
            directory,
            queue,
            max_file_size: config.max_file_size_bytes,
            allowed_extensions: config.allowed_extensions.clone(),
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Accepts an upload and returns the new `pending` analysis.
    ///
    /// Checks run in order: file present, subject reference, format, size.
    /// The job is enqueued only after the record is committed.
    pub fn upload(
        &self,
        file: Option<UploadFile>,
        description: &str,
        subject_ref: Option<&str>,
        owner: &dyn Owner,
    ) -> Result<Analysis, UploadError> {
        let mut file = file.ok_or(UploadError::NoFile)?;
        let owner_id = owner.owner_id();
        let _span = info_span!("upload",
            owner_id = owner_id,
            file = %redact_path(Path::new(&file.name)),
        )
        .entered();

        let subject_ref = match subject_ref.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let reference = parse_reference(raw)?;
                resolve_subject(self.directory.as_ref(), &reference)?;
                Some(reference)
            }
            None => None,
        };

        validate_format(&file.name, &self.allowed_extensions).map_err(|e| {
            log::warn!("File format validation failed: {}", e);
            e
        })?;
        validate_size(file.size, self.max_file_size).map_err(|e| {
            log::warn!("File size validation failed: {}", e);
            e
        })?;

        let thumbnail = {
            let _step = info_span!("thumbnail").entered();
            self.assets
                .extract_first_frame(&file.name, &mut file.content)
                .map_err(UploadError::FrameExtraction)?
        };
        file.content
            .seek(SeekFrom::Start(0))
            .map_err(UploadError::Read)?;

        let video = self
            .assets
            .store_video(owner_id, &file.name, &mut file.content)?;
        let thumbnail = match self.assets.store_thumbnail(owner_id, &thumbnail) {
            Ok(stored) => stored,
            Err(e) => {
                self.discard(&[&video]);
                return Err(e.into());
            }
        };

        let new = NewAnalysis {
            owner_id,
            subject_ref,
            description: description.to_string(),
            video: Some(video.key.clone()),
            thumbnail: Some(thumbnail.key.clone()),
            created_at: Utc::now(),
        };
        let analysis = match self
            .db
            .with_transaction(|tx| analysis_repo::insert(tx, &new))
        {
            Ok(analysis) => analysis,
            Err(e) => {
                log::error!("Failed to record upload: {}", e);
                self.discard(&[&video, &thumbnail]);
                return Err(e.into());
            }
        };

        owner.unmark_new_user();
        log::info!(
            "Video saved successfully, analysis ID: {}",
            analysis.id
        );

        self.queue
            .enqueue(AnalysisJob::new(analysis.id))
            .map_err(|e| {
                log::error!(
                    "Analysis {} recorded but not queued: {}",
                    analysis.id,
                    e
                );
                UploadError::Queue(e)
            })?;

        Ok(analysis)
    }

    fn discard(&self, assets: &[&StoredAsset]) {
        for asset in assets {
            if let Err(e) = self.assets.delete(&asset.key) {
                log::warn!("Failed to remove orphaned asset {}: {}", asset.key, e);
            }
        }
    }
}
