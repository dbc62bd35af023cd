//! Builder for seeding analyses in a chosen state.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::io::Cursor;

use larvixon::analysis::{Analysis, AnalysisStatus, FailureKind};
use larvixon::db::analysis_repo::{self, NewAnalysis};
use larvixon::db::result_repo;

use super::harness::TestHarness;

pub struct AnalysisBuilder {
    owner_id: i64,
    days_ago: i64,
    with_video: bool,
    status: AnalysisStatus,
    failure: (FailureKind, String),
}

impl AnalysisBuilder {
    pub fn new(owner_id: i64) -> Self {
        Self {
            owner_id,
            days_ago: 0,
            with_video: true,
            status: AnalysisStatus::Pending,
            failure: (
                FailureKind::ModelRequest,
                "Model request failed: no predictions returned".to_string(),
            ),
        }
    }

    pub fn created_days_ago(mut self, days: i64) -> Self {
        self.days_ago = days;
        self
    }

    pub fn without_video(mut self) -> Self {
        self.with_video = false;
        self
    }

    pub fn failed(mut self) -> Self {
        self.status = AnalysisStatus::Failed;
        self
    }

    pub fn failed_with(mut self, kind: FailureKind, message: &str) -> Self {
        self.status = AnalysisStatus::Failed;
        self.failure = (kind, message.to_string());
        self
    }

    pub fn completed(mut self) -> Self {
        self.status = AnalysisStatus::Completed;
        self
    }

    pub fn insert(self, harness: &TestHarness) -> Analysis {
        let video = if self.with_video {
            let stored = harness
                .assets
                .store_video(self.owner_id, "seed.mp4", &mut Cursor::new(b"0123456789".to_vec()))
                .unwrap();
            Some(stored.key)
        } else {
            None
        };

        let new = NewAnalysis {
            owner_id: self.owner_id,
            subject_ref: None,
            description: "seeded".to_string(),
            video,
            thumbnail: None,
            created_at: Utc::now() - Duration::days(self.days_ago),
        };
        let analysis = harness
            .db
            .with_conn(|conn| analysis_repo::insert(conn, &new))
            .unwrap();

        match self.status {
            AnalysisStatus::Failed => {
                let (kind, message) = &self.failure;
                analysis_repo::mark_failed(&harness.db, analysis.id, *kind, message).unwrap();
            }
            AnalysisStatus::Completed => {
                harness
                    .db
                    .with_transaction(|tx| {
                        result_repo::insert_ranked(
                            tx,
                            analysis.id,
                            &[("ethanol".to_string(), 100.0)],
                            Utc::now(),
                        )?;
                        analysis_repo::mark_completed(tx, analysis.id, Utc::now())
                    })
                    .unwrap();
            }
            AnalysisStatus::Pending | AnalysisStatus::Processing => {}
        }

        harness.load(analysis.id)
    }
}
