pub mod analysis;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod predictor;
pub mod retry;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod sweeper;
pub mod upload;
pub mod worker;

pub use analysis::{
    Analysis, AnalysisDetail, AnalysisRecords, AnalysisResult, AnalysisStatus, FailureKind,
    Substance,
};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{AssetError, ConfigError, LarvixonError, Result, WorkerError};
pub use pipeline::{AnalysisPipeline, ProcessOutcome};
pub use predictor::{Predictions, Predictor};
pub use retry::{RetryError, RetryGuard};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use storage::{AssetManager, AssetStore, FileAssetStore};
pub use sweeper::{RetentionSweeper, SweepReport, SweepScheduler};
pub use upload::{UploadCoordinator, UploadError, UploadFile};
pub use worker::{AnalysisJob, JobQueue, WorkerPool};
