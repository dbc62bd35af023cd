use thiserror::Error;

use crate::analysis::{FailureKind, MODEL_FAILURE_PREFIX};
use crate::db::DatabaseError;
use crate::error::AssetError;
use crate::predictor::PredictError;

/// Errors raised while processing one analysis. They never leave the
/// pipeline: each one is recorded on the analysis as a failure.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Analysis has no video to process")]
    VideoMissing,

    #[error("Video asset unavailable: {0}")]
    VideoAccess(#[from] AssetError),

    #[error("Failed to stage video: {0}")]
    Staging(#[source] std::io::Error),

    #[error("{0}")]
    Predictor(#[from] PredictError),

    #[error("no predictions returned")]
    NoPrediction,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ProcessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::VideoMissing | Self::VideoAccess(_) | Self::Staging(_) => {
                FailureKind::VideoAccess
            }
            Self::Predictor(_) | Self::NoPrediction => FailureKind::ModelRequest,
            Self::Database(_) => FailureKind::Internal,
        }
    }

    /// Message stored on the failed analysis.
    pub fn failure_message(&self) -> String {
        match self.kind() {
            FailureKind::ModelRequest => format!("{}{}", MODEL_FAILURE_PREFIX, self),
            _ => self.to_string(),
        }
    }
}
