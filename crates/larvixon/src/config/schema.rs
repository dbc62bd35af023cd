use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::analysis::CANONICAL_SUBSTANCES;
use crate::directory::SubjectRecord;

/// 3 GiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 3 * 1024 * 1024 * 1024;
pub const DEFAULT_ENDPOINT_URL: &str = "http://127.0.0.1:8001/predict";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub media_root: PathBuf,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Database location: the configured path, else `~/.larvixon/data/larvixon.db`,
    /// else `<media_root>/larvixon.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
            .unwrap_or_else(|| self.media_root.join("larvixon.db"))
    }

    /// Where chunked uploads are staged until finalized.
    pub fn staging_directory(&self) -> PathBuf {
        self.upload
            .staging_directory
            .clone()
            .unwrap_or_else(|| self.media_root.join("staging"))
    }
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_video_lifetime_days")]
    pub video_lifetime_days: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_video_lifetime_days() -> u32 {
    14
}

fn default_sweep_interval_secs() -> u64 {
    24 * 60 * 60
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            video_lifetime_days: default_video_lifetime_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub staging_directory: Option<PathBuf>,
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".mp4".to_string()]
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: default_allowed_extensions(),
            staging_directory: None,
            ffmpeg_binary: default_ffmpeg_binary(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorKind {
    Synthetic,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    #[serde(default = "default_predictor_kind")]
    pub kind: PredictorKind,
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_substances")]
    pub substances: Vec<String>,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_predictor_kind() -> PredictorKind {
    PredictorKind::Remote
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.to_string()
}

fn default_substances() -> Vec<String> {
    CANONICAL_SUBSTANCES
        .iter()
        .map(|(en, _)| en.to_string())
        .collect()
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            kind: default_predictor_kind(),
            endpoint_url: default_endpoint_url(),
            request_timeout_secs: None,
            substances: default_substances(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryKind {
    Disabled,
    Http,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_kind")]
    pub kind: DirectoryKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub api_token_file: Option<String>,
    #[serde(default)]
    pub api_token_env: Option<String>,
    #[serde(default = "default_directory_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub records: Vec<SubjectRecord>,
}

fn default_directory_kind() -> DirectoryKind {
    DirectoryKind::Disabled
}

fn default_directory_timeout() -> u64 {
    90
}

fn default_cache_ttl() -> u64 {
    60
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            kind: default_directory_kind(),
            base_url: None,
            api_token: None,
            api_token_file: None,
            api_token_env: None,
            timeout_secs: default_directory_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
