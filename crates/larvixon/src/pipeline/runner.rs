use std::any::Any;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info_span, warn};

use crate::analysis::{rank_predictions, Analysis, AnalysisStatus, FailureKind};
use crate::db::{analysis_repo, result_repo, Database};
use crate::predictor::Predictor;
use crate::storage::AssetManager;

use super::error::ProcessError;

/// What one `process` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// No analysis with that id; the job is dropped.
    Missing,
    /// The analysis was completed or failed; failed ones need a retry.
    Skipped,
    /// Results were stored, highest confidence first.
    Completed { results: Vec<(String, f64)> },
    /// The analysis was marked failed.
    Failed { kind: FailureKind, message: String },
}

impl ProcessOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Drives one analysis through `processing` to `completed` or `failed`.
pub struct AnalysisPipeline {
    db: Database,
    assets: Arc<AssetManager>,
    predictor: Arc<dyn Predictor>,
    work_dir: Option<PathBuf>,
}

impl AnalysisPipeline {
    pub fn new(db: Database, assets: Arc<AssetManager>, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            db,
            assets,
            predictor,
            work_dir: None,
        }
    }

    /// Stages working copies under `dir` instead of the system temp dir.
    pub fn with_work_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Processes one analysis. Never panics and never returns an error:
    /// every failure is recorded on the analysis.
    pub fn process(&self, analysis_id: i64) -> ProcessOutcome {
        let _span = info_span!("process_analysis",
            analysis_id = analysis_id,
            predictor = self.predictor.name(),
        )
        .entered();

        match catch_unwind(AssertUnwindSafe(|| self.run(analysis_id))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.record_failure(analysis_id, e.kind(), e.failure_message()),
            Err(panic) => {
                let message = format!("Unexpected error: {}", panic_message(panic.as_ref()));
                self.record_failure(analysis_id, FailureKind::Internal, message)
            }
        }
    }

    fn run(&self, analysis_id: i64) -> Result<ProcessOutcome, ProcessError> {
        // Step 1: Load
        let analysis = {
            let _step = info_span!("load").entered();
            match analysis_repo::find_by_id(&self.db, analysis_id)? {
                Some(analysis) => analysis,
                None => {
                    warn!("Analysis {} not found, dropping job", analysis_id);
                    return Ok(ProcessOutcome::Missing);
                }
            }
        };
        if !analysis.status.is_runnable() {
            debug!(
                "Analysis {} already {}, skipping",
                analysis_id, analysis.status
            );
            return Ok(ProcessOutcome::Skipped);
        }

        // Step 2: Transition to processing
        if !analysis_repo::mark_processing(&self.db, analysis_id)? {
            debug!("Analysis {} finished concurrently, skipping", analysis_id);
            return Ok(ProcessOutcome::Skipped);
        }

        // Step 3: Stage a working copy; removed when `staged` drops.
        let staged = {
            let _step = info_span!("stage_video").entered();
            self.stage_video(&analysis)?
        };

        // Step 4: Predict
        let predictions = {
            let _step = info_span!("predict").entered();
            self.predictor
                .predict(staged.path())?
                .filter(|p| !p.is_empty())
                .ok_or(ProcessError::NoPrediction)?
        };

        // Step 5: Persist results and completion together
        let ranked = rank_predictions(predictions);
        {
            let _step = info_span!("persist_results", count = ranked.len()).entered();
            let now = Utc::now();
            self.db.with_transaction(|tx| {
                result_repo::delete_for_analysis(tx, analysis_id)?;
                result_repo::insert_ranked(tx, analysis_id, &ranked, now)?;
                analysis_repo::mark_completed(tx, analysis_id, now)?;
                Ok(())
            })?;
        }

        log::info!(
            "Analysis {} completed with {} results",
            analysis_id,
            ranked.len()
        );
        Ok(ProcessOutcome::Completed { results: ranked })
    }

    fn stage_video(&self, analysis: &Analysis) -> Result<NamedTempFile, ProcessError> {
        let key = analysis.video.as_deref().ok_or(ProcessError::VideoMissing)?;
        let mut source = self.assets.open(key)?;

        let suffix = Path::new(key)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("larvixon-analysis-").suffix(&suffix);
        let mut staged = match &self.work_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(ProcessError::Staging)?;

        std::io::copy(&mut source, &mut staged).map_err(ProcessError::Staging)?;
        staged.flush().map_err(ProcessError::Staging)?;
        Ok(staged)
    }

    fn record_failure(&self, analysis_id: i64, kind: FailureKind, message: String) -> ProcessOutcome {
        log::error!(
            "Analysis {} failed ({}): {}",
            analysis_id,
            kind,
            message
        );
        if let Err(e) = analysis_repo::mark_failed(&self.db, analysis_id, kind, &message) {
            log::error!(
                "Could not record failure for analysis {}: {}",
                analysis_id,
                e
            );
        }
        ProcessOutcome::Failed { kind, message }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
