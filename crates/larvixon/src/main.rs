//! larvixon: video analysis daemon and maintenance commands.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast;

use larvixon::analysis::{AnalysisRecords, CANONICAL_SUBSTANCES};
use larvixon::config::{load_config, Config};
use larvixon::db::{analysis_repo, substance_repo, Database};
use larvixon::directory::{self, SubjectDirectory};
use larvixon::error::LarvixonError;
use larvixon::logging::init_logging;
use larvixon::pipeline::AnalysisPipeline;
use larvixon::predictor;
use larvixon::retry::RetryGuard;
use larvixon::storage::{AssetManager, FfmpegFrameExtractor, FileAssetStore};
use larvixon::sweeper::{RetentionSweeper, SweepScheduler};
use larvixon::upload::{ChunkStatus, ChunkedUploadStager, OwnerId, UploadCoordinator, UploadFile};
use larvixon::worker::{requeue_pending, ChannelQueue, WorkerPool};

#[derive(Parser)]
#[command(name = "larvixon", version, about = "Video analysis pipeline")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "LARVIXON_CONFIG", default_value = "larvixon.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workers and the retention scheduler until interrupted
    Run,

    /// Upload a video and process it
    Upload {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "")]
        description: String,
        /// Subject reference (UUID) to link the analysis to
        #[arg(long)]
        subject: Option<String>,
        /// Send the file through the resumable upload path in chunks of this many bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Retry a failed analysis
    Retry {
        id: i64,
        #[arg(long)]
        owner: i64,
    },

    /// Process one analysis immediately
    Process { id: i64 },

    /// Prune videos past the retention window
    Sweep,

    /// Show an analysis with its results
    Show {
        id: i64,
        #[arg(long)]
        owner: i64,
    },

    /// Delete an analysis and its assets
    Delete {
        id: i64,
        #[arg(long)]
        owner: i64,
    },

    /// Insert or refresh the canonical substance catalogue
    SeedSubstances,
}

/// Shared services built once from config.
struct App {
    config: Config,
    db: Database,
    assets: Arc<AssetManager>,
    pipeline: Arc<AnalysisPipeline>,
    directory: Arc<dyn SubjectDirectory>,
}

impl App {
    fn build(config: Config) -> Result<Self, LarvixonError> {
        let db = Database::open(&config.database_path())?;
        let store = Arc::new(FileAssetStore::new(&config.media_root));
        let extractor = Arc::new(FfmpegFrameExtractor::with_binary(
            &config.upload.ffmpeg_binary,
        ));
        let assets = Arc::new(AssetManager::new(store, extractor));
        let predictor = predictor::from_config(&config.predictor)?;
        let pipeline = Arc::new(AnalysisPipeline::new(
            db.clone(),
            Arc::clone(&assets),
            predictor,
        ));
        let directory = directory::from_config(&config.directory)?;

        Ok(Self {
            config,
            db,
            assets,
            pipeline,
            directory,
        })
    }

    fn records(&self) -> AnalysisRecords {
        AnalysisRecords::new(self.db.clone(), Arc::clone(&self.assets))
    }

    fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(
            self.db.clone(),
            Arc::clone(&self.assets),
            self.config.retention.video_lifetime_days,
        )
    }

    /// Runs every queued job on the calling thread.
    fn drain(&self, queue: &ChannelQueue) {
        for job in queue.drain() {
            let outcome = self.pipeline.process(job.analysis_id);
            log::info!("Analysis {}: {:?}", job.analysis_id, outcome);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match execute(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Commands, config: Config) -> Result<(), LarvixonError> {
    let app = App::build(config)?;

    match command {
        Commands::Run => run_daemon(&app),
        Commands::Upload {
            owner,
            file,
            description,
            subject,
            chunk_size,
        } => {
            let queue = Arc::new(ChannelQueue::new());
            let coordinator = UploadCoordinator::new(
                app.db.clone(),
                Arc::clone(&app.assets),
                Arc::clone(&app.directory),
                queue.clone(),
                &app.config.upload,
            );
            let analysis = match chunk_size {
                Some(size) => upload_chunked(
                    &app,
                    &coordinator,
                    &file,
                    size,
                    &description,
                    subject.as_deref(),
                    owner,
                )?,
                None => {
                    let name = file_name(&file);
                    let upload = UploadFile::open(&file, name).map_err(|e| LarvixonError::Io {
                        path: file.clone(),
                        source: e,
                    })?;
                    coordinator.upload(
                        Some(upload),
                        &description,
                        subject.as_deref(),
                        &OwnerId(owner),
                    )?
                }
            };
            app.drain(&queue);
            print_json(&app.records().get_for_owner(analysis.id, owner)?)
        }
        Commands::Retry { id, owner } => {
            let queue = Arc::new(ChannelQueue::new());
            let guard = RetryGuard::new(
                app.db.clone(),
                queue.clone(),
                app.config.retention.video_lifetime_days,
            );
            guard.retry(id, owner)?;
            app.drain(&queue);
            print_json(&app.records().get_for_owner(id, owner)?)
        }
        Commands::Process { id } => {
            let outcome = app.pipeline.process(id);
            log::info!("Analysis {}: {:?}", id, outcome);
            match analysis_repo::find_by_id(&app.db, id)? {
                Some(analysis) => print_json(&analysis),
                None => print_json(&serde_json::json!({ "id": id, "found": false })),
            }
        }
        Commands::Sweep => print_json(&app.sweeper().sweep(chrono::Utc::now())?),
        Commands::Show { id, owner } => print_json(&app.records().get_for_owner(id, owner)?),
        Commands::Delete { id, owner } => {
            print_json(&app.records().delete_for_owner(id, owner)?)
        }
        Commands::SeedSubstances => {
            let written = substance_repo::seed(&app.db, CANONICAL_SUBSTANCES)?;
            log::info!("Seeded {} substances", written);
            print_json(&substance_repo::list(&app.db)?)
        }
    }
}

fn run_daemon(app: &App) -> Result<(), LarvixonError> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal");
            stop.store(true, Ordering::SeqCst);
        })
        .map_err(|e| larvixon::error::WorkerError::SpawnFailed(e.to_string()))?;
    }

    let pool = WorkerPool::new(Arc::clone(&app.pipeline), app.config.worker_count);
    requeue_pending(&app.db, &pool)?;

    let scheduler = SweepScheduler::new(
        Arc::new(app.sweeper()),
        Duration::from_secs(app.config.retention.sweep_interval_secs),
    );
    let (trigger_tx, trigger_rx) = broadcast::channel(4);
    let scheduler_handle = scheduler.start(trigger_rx);

    log::info!(
        "larvixon running with {} workers; press Ctrl-C to stop",
        app.config.worker_count
    );

    while !stop.load(Ordering::SeqCst) {
        if let Some(report) = pool.recv_result_timeout(Duration::from_millis(200)) {
            log::info!("Analysis {}: {:?}", report.analysis_id, report.outcome);
        }
    }

    scheduler.stop();
    // Wakes the scheduler so it sees the stop flag before the next tick.
    if trigger_tx.send(()).is_err() {
        log::debug!("Sweep scheduler already stopped");
    }
    if scheduler_handle.join().is_err() {
        log::error!("Sweep scheduler panicked");
    }

    pool.shutdown();
    pool.wait();
    Ok(())
}

fn upload_chunked(
    app: &App,
    coordinator: &UploadCoordinator,
    path: &Path,
    chunk_size: usize,
    description: &str,
    subject: Option<&str>,
    owner: i64,
) -> Result<larvixon::Analysis, LarvixonError> {
    let io_err = |e: std::io::Error| LarvixonError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let name = file_name(path);
    let total = std::fs::metadata(path).map_err(io_err)?.len();
    let mut file = std::fs::File::open(path).map_err(io_err)?;

    let stager =
        ChunkedUploadStager::new(app.config.staging_directory(), coordinator.max_file_size());
    let upload_id = uuid::Uuid::new_v4().simple().to_string();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut offset = 0u64;

    loop {
        let read = file.read(&mut buffer).map_err(io_err)?;
        let range = if read == 0 {
            format!("bytes */{}", total)
        } else {
            format!("bytes {}-{}/{}", offset, offset + read as u64 - 1, total)
        };
        let status = stager.append_chunk(
            &upload_id,
            &name,
            &mut &buffer[..read],
            Some(&range),
        )?;
        offset += read as u64;

        match status {
            ChunkStatus::Complete(staged) => {
                return Ok(stager.finalize(
                    coordinator,
                    &staged,
                    &name,
                    description,
                    subject,
                    &OwnerId(owner),
                )?);
            }
            ChunkStatus::Partial { received } if read == 0 => {
                return Err(io_err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("file ended after {} of {} bytes", received, total),
                )));
            }
            ChunkStatus::Partial { .. } => {}
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), LarvixonError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
