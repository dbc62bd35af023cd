pub mod job;
pub mod pool;
pub mod queue;

pub use job::{AnalysisJob, JobReport};
pub use pool::WorkerPool;
pub use queue::{requeue_pending, ChannelQueue, JobQueue};
