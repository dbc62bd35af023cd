//! Analysis domain model: the unit of work, its graded results, and the
//! substance catalogue they reference.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

pub mod records;

pub use records::{AnalysisDetail, AnalysisRecords, RecordsError};

/// Prefix carried by every failure message caused by the predictor.
pub const MODEL_FAILURE_PREFIX: &str = "Model request failed: ";

/// Canonical substance catalogue as `(english, polish)` pairs.
pub const CANONICAL_SUBSTANCES: &[(&str, &str)] = &[
    ("cocaine", "kokaina"),
    ("morphine", "morfina"),
    ("ethanol", "etanol"),
    ("ketamine", "ketamina"),
    ("tetrodotoxin", "tetrodotoksyna"),
];

/// Lifecycle state of an analysis.
///
/// `pending → processing → {completed, failed}`; `failed → pending` only
/// through a retry. `completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether a queued job may work on an analysis in this state.
    /// Failed analyses become runnable again only through a retry.
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown analysis status '{}'", other)),
        }
    }
}

/// Why an analysis ended up `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The predictor produced nothing or its call failed. Usually transient.
    ModelRequest,
    /// The stored video could not be opened or staged.
    VideoAccess,
    /// Anything else, including a panic inside the job.
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelRequest => "model_request",
            Self::VideoAccess => "video_access",
            Self::Internal => "internal",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ModelRequest)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_request" => Ok(Self::ModelRequest),
            "video_access" => Ok(Self::VideoAccess),
            "internal" => Ok(Self::Internal),
            other => Err(format!("unknown failure kind '{}'", other)),
        }
    }
}

/// A submitted video and the state of its classification.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: i64,
    pub owner_id: i64,
    pub subject_ref: Option<Uuid>,
    pub description: String,
    /// Asset key of the stored video. `None` once reclaimed by the sweeper.
    pub video: Option<String>,
    pub thumbnail: Option<String>,
    pub status: AnalysisStatus,
    pub error_message: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Analysis {
    /// Age of the analysis at `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// A canonical substance label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Substance {
    pub id: i64,
    pub name_en: String,
    pub name_pl: Option<String>,
}

/// One scored substance for one analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub id: i64,
    pub analysis_id: i64,
    pub substance_id: i64,
    pub substance: String,
    /// Percentage points, 0-100.
    pub confidence_score: f64,
    pub detected_at: DateTime<Utc>,
}

/// Orders predictions by descending confidence. Ties keep name order so
/// the insert order is deterministic.
/// `days` before `now`, clamped to the earliest representable instant.
pub fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn rank_predictions<I>(predictions: I) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut ranked: Vec<(String, f64)> = predictions.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}
