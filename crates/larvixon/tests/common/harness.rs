//! Test harness for isolated execution of the analysis pipeline.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageBuffer, Rgb};
use tempfile::TempDir;

use larvixon::analysis::{Analysis, AnalysisRecords, AnalysisResult};
use larvixon::config::UploadConfig;
use larvixon::db::{analysis_repo, result_repo, Database};
use larvixon::directory::{DisabledDirectory, SubjectDirectory};
use larvixon::error::AssetError;
use larvixon::pipeline::{AnalysisPipeline, ProcessOutcome};
use larvixon::predictor::{PredictError, Predictions, Predictor};
use larvixon::retry::RetryGuard;
use larvixon::storage::{AssetManager, FileAssetStore, FrameExtractor};
use larvixon::sweeper::RetentionSweeper;
use larvixon::upload::{OwnerId, UploadCoordinator, UploadError, UploadFile};
use larvixon::worker::ChannelQueue;

/// Frame extractor that returns a solid 8x8 frame for any readable file.
pub struct StubFrames;

impl FrameExtractor for StubFrames {
    fn first_frame(&self, video: &Path) -> Result<DynamicImage, AssetError> {
        if !video.exists() {
            return Err(AssetError::FrameExtraction("missing".to_string()));
        }
        Ok(DynamicImage::ImageRgb8(ImageBuffer::from_pixel(
            8,
            8,
            Rgb([200, 120, 40]),
        )))
    }
}

/// Predictor returning a fixed answer, recording every call.
pub struct ScriptedPredictor {
    answer: Option<Vec<(&'static str, f64)>>,
    calls: Mutex<usize>,
}

impl ScriptedPredictor {
    pub fn returning(scores: &[(&'static str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(scores.to_vec()),
            calls: Mutex::new(0),
        })
    }

    pub fn nothing() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Predictor for ScriptedPredictor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn predict(&self, _video: &Path) -> Result<Option<Predictions>, PredictError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .answer
            .as_ref()
            .map(|scores| scores.iter().map(|(n, s)| (n.to_string(), *s)).collect()))
    }
}

/// Isolated environment: temp media root, scratch dir for staged videos,
/// in-memory database and a collecting queue.
pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub assets: Arc<AssetManager>,
    pub queue: Arc<ChannelQueue>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        std::fs::create_dir_all(temp_dir.path().join("media")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("work")).unwrap();

        let store = Arc::new(FileAssetStore::new(temp_dir.path().join("media")));
        let assets = Arc::new(AssetManager::new(store, Arc::new(StubFrames)));

        Self {
            db: Database::open_in_memory().expect("Failed to open database"),
            assets,
            queue: Arc::new(ChannelQueue::new()),
            temp_dir,
        }
    }

    pub fn media_root(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("media")
    }

    pub fn work_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("work")
    }

    pub fn coordinator(&self) -> UploadCoordinator {
        self.coordinator_with(Arc::new(DisabledDirectory))
    }

    pub fn coordinator_with(&self, directory: Arc<dyn SubjectDirectory>) -> UploadCoordinator {
        UploadCoordinator::new(
            self.db.clone(),
            Arc::clone(&self.assets),
            directory,
            self.queue.clone(),
            &UploadConfig::default(),
        )
    }

    pub fn pipeline(&self, predictor: Arc<dyn Predictor>) -> AnalysisPipeline {
        AnalysisPipeline::new(self.db.clone(), Arc::clone(&self.assets), predictor)
            .with_work_dir(self.work_dir())
    }

    pub fn retry_guard(&self, window_days: u32) -> RetryGuard {
        RetryGuard::new(self.db.clone(), self.queue.clone(), window_days)
    }

    pub fn sweeper(&self, lifetime_days: u32) -> RetentionSweeper {
        RetentionSweeper::new(self.db.clone(), Arc::clone(&self.assets), lifetime_days)
    }

    pub fn records(&self) -> AnalysisRecords {
        AnalysisRecords::new(self.db.clone(), Arc::clone(&self.assets))
    }

    pub fn upload(&self, owner: i64, name: &str, bytes: &[u8]) -> Result<Analysis, UploadError> {
        self.coordinator().upload(
            Some(UploadFile::from_bytes(name, bytes.to_vec())),
            "",
            None,
            &OwnerId(owner),
        )
    }

    /// Processes every queued job with `pipeline`.
    pub fn run_queued(&self, pipeline: &AnalysisPipeline) -> Vec<ProcessOutcome> {
        self.queue
            .drain()
            .into_iter()
            .map(|job| pipeline.process(job.analysis_id))
            .collect()
    }

    pub fn load(&self, id: i64) -> Analysis {
        analysis_repo::find_by_id(&self.db, id)
            .unwrap()
            .expect("analysis should exist")
    }

    pub fn results(&self, id: i64) -> Vec<AnalysisResult> {
        self.db
            .with_conn(|c| result_repo::list_for_analysis(c, id))
            .unwrap()
    }

    pub fn asset_exists(&self, key: &str) -> bool {
        self.media_root().join(key).exists()
    }

    pub fn work_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.work_dir()).unwrap().next().is_none()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks the state-machine invariants every stored analysis must hold.
pub fn assert_state_invariants(analysis: &Analysis) {
    use larvixon::analysis::AnalysisStatus;

    assert_eq!(
        analysis.completed_at.is_some(),
        analysis.status == AnalysisStatus::Completed,
        "completed_at must be set exactly when completed: {:?}",
        analysis
    );
    if analysis.error_message.is_some() {
        assert_eq!(analysis.status, AnalysisStatus::Failed, "{:?}", analysis);
    }
}
