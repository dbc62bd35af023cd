use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::error::{AssetError, WorkerError};

const GIB: f64 = (1u64 << 30) as f64;

fn gib(bytes: &u64) -> f64 {
    *bytes as f64 / GIB
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No video file provided")]
    NoFile,

    #[error("Invalid subject reference '{0}': expected a UUID")]
    InvalidReferenceFormat(String),

    #[error("Subject with reference {0} not found")]
    ReferenceNotFound(Uuid),

    #[error("Subject directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error(
        "Unsupported file format: {extension}. Only {} files are allowed.",
        .allowed.join(", ")
    )]
    UnsupportedFormat {
        extension: String,
        allowed: Vec<String>,
    },

    #[error(
        "Video file is too large ({:.2} GB). Maximum allowed size is {:.2} GB.",
        gib(.size),
        gib(.max)
    )]
    TooLarge { size: u64, max: u64 },

    #[error("Failed to derive thumbnail: {0}")]
    FrameExtraction(#[source] AssetError),

    #[error("Failed to read uploaded file: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to store upload: {0}")]
    Asset(#[from] AssetError),

    #[error("Failed to record upload: {0}")]
    Database(#[from] DatabaseError),

    #[error("Upload saved but could not be queued for processing: {0}")]
    Queue(#[from] WorkerError),
}
