//! Shared test utilities for larvixon integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temp media root and an
//!   in-memory database
//! - Stub collaborators (frame extractor, scripted predictor)
//! - `AnalysisBuilder` for seeding records in a given state

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
