//! Substance predictors.
//!
//! A predictor scores a local video file and returns a map of substance
//! name to confidence (percentage points). `Ok(None)` and an empty map both
//! mean "no usable prediction"; the pipeline treats them as a failed model
//! request.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{PredictorConfig, PredictorKind};

pub mod remote;
pub mod synthetic;

pub use remote::RemotePredictor;
pub use synthetic::SyntheticPredictor;

/// Substance name → confidence in percentage points.
pub type Predictions = HashMap<String, f64>;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Failed to build predictor client: {0}")]
    Client(String),

    #[error("Prediction failed: {0}")]
    Failed(String),
}

pub trait Predictor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn predict(&self, video: &Path) -> Result<Option<Predictions>, PredictError>;
}

/// Builds the predictor selected by config.
pub fn from_config(config: &PredictorConfig) -> Result<Arc<dyn Predictor>, PredictError> {
    match config.kind {
        PredictorKind::Synthetic => {
            log::info!(
                "Using synthetic predictor over {} substances",
                config.substances.len()
            );
            Ok(Arc::new(SyntheticPredictor::new(
                config.substances.clone(),
                config.seed,
            )))
        }
        PredictorKind::Remote => {
            log::info!(
                "Using remote predictor at {}",
                crate::sanitize::redact_url(&config.endpoint_url)
            );
            let predictor = RemotePredictor::new(
                config.endpoint_url.clone(),
                config.request_timeout_secs.map(Duration::from_secs),
            )?;
            Ok(Arc::new(predictor))
        }
    }
}
