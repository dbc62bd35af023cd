use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::db::{analysis_repo, Database};
use crate::error::{LarvixonError, WorkerError};
use crate::worker::job::AnalysisJob;

/// Destination for processing jobs. Delivery is at-least-once; the
/// pipeline tolerates a redelivered job.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: AnalysisJob) -> Result<(), WorkerError>;
}

/// Unbounded in-process queue whose jobs are drained by the caller.
///
/// Used by one-shot commands that run their jobs inline, and by tests.
pub struct ChannelQueue {
    sender: Sender<AnalysisJob>,
    receiver: Receiver<AnalysisJob>,
}

impl ChannelQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Takes every job currently queued.
    pub fn drain(&self) -> Vec<AnalysisJob> {
        self.receiver.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for ChannelQueue {
    fn enqueue(&self, job: AnalysisJob) -> Result<(), WorkerError> {
        self.sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

/// Re-enqueues every unfinished analysis, oldest first. The queue is not
/// durable, so jobs accepted before a restart are recovered here. Rows left
/// `processing` by a crashed daemon are included; call this only before
/// any worker of this process has started a job.
pub fn requeue_pending(db: &Database, queue: &dyn JobQueue) -> Result<usize, LarvixonError> {
    let ids = analysis_repo::list_unfinished_ids(db)?;
    for id in &ids {
        queue.enqueue(AnalysisJob::new(*id))?;
    }
    if !ids.is_empty() {
        log::info!("Requeued {} pending analyses", ids.len());
    }
    Ok(ids.len())
}
