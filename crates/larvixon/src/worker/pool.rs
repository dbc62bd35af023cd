use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::pipeline::AnalysisPipeline;
use crate::worker::job::{AnalysisJob, JobReport};
use crate::worker::queue::JobQueue;

pub struct WorkerPool {
    job_sender: Sender<AnalysisJob>,
    result_receiver: Receiver<JobReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` threads sharing one pipeline.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(pipeline: Arc<AnalysisPipeline>, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = bounded::<AnalysisJob>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<JobReport>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);

            let handle = thread::spawn(move || {
                run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_pipeline);
            });

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        }
    }

    /// Queues a job, blocking while the channel is full.
    pub fn submit(&self, job: AnalysisJob) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobReport> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobReport> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobReport> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl JobQueue for WorkerPool {
    fn enqueue(&self, job: AnalysisJob) -> Result<(), WorkerError> {
        self.submit(job)
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<AnalysisJob>,
    result_sender: Sender<JobReport>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<AnalysisPipeline>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                debug!(
                    "Worker {} processing analysis {}",
                    worker_id, job.analysis_id
                );

                let outcome = pipeline.process(job.analysis_id);

                if let Err(e) = result_sender.send(JobReport::new(job, outcome)) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
