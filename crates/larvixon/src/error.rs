use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LarvixonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Upload rejected: {0}")]
    Upload(#[from] crate::upload::UploadError),

    #[error("Chunked upload rejected: {0}")]
    Chunk(#[from] crate::upload::ChunkError),

    #[error("Retry rejected: {0}")]
    Retry(#[from] crate::retry::RetryError),

    #[error("Record error: {0}")]
    Records(#[from] crate::analysis::RecordsError),

    #[error("Predictor error: {0}")]
    Predictor(#[from] crate::predictor::PredictError),

    #[error("Subject directory error: {0}")]
    Directory(#[from] crate::directory::DirectoryError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid environment override '{name}': {reason}")]
    InvalidOverride { name: String, reason: String },

    #[error("Failed to resolve secret: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write asset '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open asset '{key}': {source}")]
    Open {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete asset '{key}': {source}")]
    Delete {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid asset key '{0}'")]
    InvalidKey(String),

    #[error("No free name for asset: {0}")]
    NameExhausted(PathBuf),

    #[error("Frame extraction failed: {0}")]
    FrameExtraction(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, LarvixonError>;
