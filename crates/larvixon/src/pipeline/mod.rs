//! Processing orchestrator: runs one analysis through prediction and
//! records the outcome.

pub mod error;
pub mod runner;

pub use error::ProcessError;
pub use runner::{AnalysisPipeline, ProcessOutcome};
