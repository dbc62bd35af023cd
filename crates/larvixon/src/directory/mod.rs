//! Client contract for the external subject (patient) directory.
//!
//! Uploads may link an analysis to a subject by UUID. The directory
//! answers "found", "not found", or fails; a failure is never treated as
//! "not found".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{DirectoryConfig, DirectoryKind};
use crate::error::ConfigError;
use crate::secrets::resolve_secret_optional;

pub mod http;

pub use http::HttpDirectory;

#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    #[error("Subject directory unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected response from subject directory: {0}")]
    InvalidResponse(String),
}

/// A subject as known to the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub guid: Uuid,
    #[serde(default)]
    pub pesel: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// Lookup of subjects by reference.
pub trait SubjectDirectory: Send + Sync {
    fn get_by_reference(&self, reference: &Uuid) -> Result<Option<SubjectRecord>, DirectoryError>;
}

/// In-memory directory for development setups.
pub struct StaticDirectory {
    records: HashMap<Uuid, SubjectRecord>,
}

impl StaticDirectory {
    pub fn new<I: IntoIterator<Item = SubjectRecord>>(records: I) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.guid, r)).collect(),
        }
    }
}

impl SubjectDirectory for StaticDirectory {
    fn get_by_reference(&self, reference: &Uuid) -> Result<Option<SubjectRecord>, DirectoryError> {
        Ok(self.records.get(reference).cloned())
    }
}

/// Directory used when none is configured. Every lookup fails, so subject
/// linkage can never silently succeed.
pub struct DisabledDirectory;

impl SubjectDirectory for DisabledDirectory {
    fn get_by_reference(&self, _reference: &Uuid) -> Result<Option<SubjectRecord>, DirectoryError> {
        Err(DirectoryError::Unavailable(
            "no subject directory is configured".to_string(),
        ))
    }
}

/// Builds the directory selected by config.
pub fn from_config(config: &DirectoryConfig) -> Result<Arc<dyn SubjectDirectory>, ConfigError> {
    match config.kind {
        DirectoryKind::Disabled => Ok(Arc::new(DisabledDirectory)),
        DirectoryKind::Static => Ok(Arc::new(StaticDirectory::new(config.records.clone()))),
        DirectoryKind::Http => {
            let base_url = config
                .base_url
                .clone()
                .ok_or_else(|| ConfigError::Validation {
                    message: "directory.base_url is required for the http directory".to_string(),
                })?;
            let token = resolve_secret_optional(
                config.api_token.as_deref(),
                config.api_token_file.as_deref(),
                config.api_token_env.as_deref(),
            )?;
            let directory = HttpDirectory::new(
                base_url,
                token,
                Duration::from_secs(config.timeout_secs),
                Duration::from_secs(config.cache_ttl_secs),
            )
            .map_err(|e| ConfigError::Validation {
                message: e.to_string(),
            })?;
            Ok(Arc::new(directory))
        }
    }
}
