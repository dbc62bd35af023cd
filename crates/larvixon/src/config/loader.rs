use std::path::Path;

use crate::config::schema::{Config, DirectoryKind, PredictorKind};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub const ENV_MOCK_ML: &str = "LARVIXON_MOCK_ML";
pub const ENV_ML_ENDPOINT_URL: &str = "LARVIXON_ML_ENDPOINT_URL";
pub const ENV_VIDEO_LIFETIME_DAYS: &str = "LARVIXON_VIDEO_LIFETIME_DAYS";

/// One hundred years.
pub const MAX_VIDEO_LIFETIME_DAYS: u32 = 36_500;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Parses, schema-checks, validates and applies environment overrides.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let mut config = parse_config(content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Like [`load_config_from_str`] without consulting the environment.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: Config = serde_json::from_value(json_value)?;
    normalize(&mut config);

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn normalize(config: &mut Config) {
    for ext in &mut config.upload.allowed_extensions {
        *ext = ext.to_ascii_lowercase();
    }
}

/// Applies `LARVIXON_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_MOCK_ML) {
        let mock = parse_bool(&raw).ok_or_else(|| ConfigError::InvalidOverride {
            name: ENV_MOCK_ML.to_string(),
            reason: format!("expected true/false, got '{}'", raw),
        })?;
        config.predictor.kind = if mock {
            PredictorKind::Synthetic
        } else {
            PredictorKind::Remote
        };
        log::debug!("{} selects the {:?} predictor", ENV_MOCK_ML, config.predictor.kind);
    }

    if let Some(url) = lookup(ENV_ML_ENDPOINT_URL) {
        let url = url.trim().to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidOverride {
                name: ENV_ML_ENDPOINT_URL.to_string(),
                reason: "must be an http(s) URL".to_string(),
            });
        }
        config.predictor.endpoint_url = url;
    }

    if let Some(raw) = lookup(ENV_VIDEO_LIFETIME_DAYS) {
        let days = raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| ConfigError::InvalidOverride {
                name: ENV_VIDEO_LIFETIME_DAYS.to_string(),
                reason: format!("expected a positive number of days, got '{}'", raw),
            })?;
        config.retention.video_lifetime_days = days;
    }

    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.retention.video_lifetime_days == 0 {
        return Err(ConfigError::Validation {
            message: "retention.video_lifetime_days must be at least 1".to_string(),
        });
    }
    if config.retention.video_lifetime_days > MAX_VIDEO_LIFETIME_DAYS {
        return Err(ConfigError::Validation {
            message: format!(
                "retention.video_lifetime_days must be at most {}",
                MAX_VIDEO_LIFETIME_DAYS
            ),
        });
    }

    if config.upload.allowed_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "upload.allowed_extensions must not be empty".to_string(),
        });
    }
    if let Some(ext) = config
        .upload
        .allowed_extensions
        .iter()
        .find(|e| !e.starts_with('.') || e.len() < 2)
    {
        return Err(ConfigError::Validation {
            message: format!("Allowed extension '{}' must look like '.mp4'", ext),
        });
    }

    if config.predictor.kind == PredictorKind::Remote && config.predictor.endpoint_url.is_empty() {
        return Err(ConfigError::Validation {
            message: "predictor.endpoint_url is required for the remote predictor".to_string(),
        });
    }

    if config.directory.kind == DirectoryKind::Http
        && config
            .directory
            .base_url
            .as_deref()
            .map_or(true, str::is_empty)
    {
        return Err(ConfigError::Validation {
            message: "directory.base_url is required for the http directory".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"{ "version": "1.0", "media_root": "/srv/media" }"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_valid_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "media_root": "/srv/media",
            "worker_count": 4,
            "retention": { "video_lifetime_days": 7 },
            "upload": { "allowed_extensions": [".MP4", ".mov"] },
            "predictor": { "kind": "synthetic", "seed": 42 },
            "logging": { "level": "debug", "format": "json" }
        }
        "#;

        let config = parse_config(config_json).unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.retention.video_lifetime_days, 7);
        assert_eq!(config.upload.allowed_extensions, vec![".mp4", ".mov"]);
        assert_eq!(config.predictor.kind, PredictorKind::Synthetic);
        assert_eq!(config.predictor.seed, Some(42));
    }

    #[test]
    fn test_invalid_version() {
        let result = parse_config(r#"{ "version": "2.0", "media_root": "/m" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_media_root_fails_schema() {
        let result = parse_config(r#"{ "version": "1.0" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_field_fails_schema() {
        let result = parse_config(r#"{ "version": "1.0", "media_root": "/m", "turbo": true }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_bad_extension_fails_schema() {
        let result = parse_config(
            r#"{ "version": "1.0", "media_root": "/m", "upload": { "allowed_extensions": ["mp4"] } }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_http_directory_requires_base_url() {
        let result = parse_config(
            r#"{ "version": "1.0", "media_root": "/m", "directory": { "kind": "http" } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let result = parse_config("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = parse_config(MINIMAL).unwrap();
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_MOCK_ML, "true"),
                (ENV_ML_ENDPOINT_URL, "https://ml.internal/predict"),
                (ENV_VIDEO_LIFETIME_DAYS, "30"),
            ]),
        )
        .unwrap();

        assert_eq!(config.predictor.kind, PredictorKind::Synthetic);
        assert_eq!(config.predictor.endpoint_url, "https://ml.internal/predict");
        assert_eq!(config.retention.video_lifetime_days, 30);
    }

    #[test]
    fn test_mock_ml_false_forces_remote() {
        let mut config =
            parse_config(r#"{ "version": "1.0", "media_root": "/m", "predictor": { "kind": "synthetic" } }"#)
                .unwrap();
        apply_env_overrides(&mut config, env(&[(ENV_MOCK_ML, "0")])).unwrap();
        assert_eq!(config.predictor.kind, PredictorKind::Remote);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        let mut config = parse_config(MINIMAL).unwrap();
        let err = apply_env_overrides(&mut config, env(&[(ENV_MOCK_ML, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));

        let err =
            apply_env_overrides(&mut config, env(&[(ENV_VIDEO_LIFETIME_DAYS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));

        let err = apply_env_overrides(&mut config, env(&[(ENV_ML_ENDPOINT_URL, "ftp://x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    #[serial]
    fn test_load_config_reads_process_env() {
        std::env::set_var(ENV_VIDEO_LIFETIME_DAYS, "3");
        let config = load_config_from_str(MINIMAL);
        std::env::remove_var(ENV_VIDEO_LIFETIME_DAYS);

        assert_eq!(config.unwrap().retention.video_lifetime_days, 3);
    }

    #[test]
    fn test_lifetime_upper_bound() {
        let err = parse_config(
            r#"{ "version": "1.0", "media_root": "/m", "retention": { "video_lifetime_days": 36501 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));

        let config = parse_config(
            r#"{ "version": "1.0", "media_root": "/m", "retention": { "video_lifetime_days": 36500 } }"#,
        )
        .unwrap();
        assert_eq!(config.retention.video_lifetime_days, MAX_VIDEO_LIFETIME_DAYS);
    }

    #[test]
    #[serial]
    fn test_oversized_lifetime_override_rejected() {
        std::env::set_var(ENV_VIDEO_LIFETIME_DAYS, "100000000");
        let result = load_config_from_str(MINIMAL);
        std::env::remove_var(ENV_VIDEO_LIFETIME_DAYS);

        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/larvixon.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
