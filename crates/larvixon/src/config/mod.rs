pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, load_config, load_config_from_str, parse_config};
pub use schema::{
    Config, DirectoryConfig, DirectoryKind, LogFormat, LoggingConfig, PredictorConfig,
    PredictorKind, RetentionConfig, UploadConfig,
};
