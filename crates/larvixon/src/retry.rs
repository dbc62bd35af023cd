//! Retry guard: re-runs a failed analysis, subject to ownership and
//! retention eligibility.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::analysis::{days_before, Analysis, AnalysisStatus};
use crate::db::{analysis_repo, result_repo, Database, DatabaseError};
use crate::error::WorkerError;
use crate::worker::{AnalysisJob, JobQueue};

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Analysis not found or you do not have permission to access it.")]
    NotFound,

    #[error("Only failed analyses can be retried.")]
    NotFailed,

    #[error(
        "Analysis is too old to retry. Only analyses created within the last {window_days} days can be retried."
    )]
    TooOld { window_days: u32 },

    #[error("Video file no longer exists. Cannot retry this analysis.")]
    VideoGone,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Analysis reset but could not be queued: {0}")]
    Queue(#[from] WorkerError),
}

pub struct RetryGuard {
    db: Database,
    queue: Arc<dyn JobQueue>,
    window_days: u32,
}

impl RetryGuard {
    pub fn new(db: Database, queue: Arc<dyn JobQueue>, window_days: u32) -> Self {
        Self {
            db,
            queue,
            window_days,
        }
    }

    pub fn retry(&self, analysis_id: i64, owner_id: i64) -> Result<Analysis, RetryError> {
        self.retry_at(analysis_id, owner_id, Utc::now())
    }

    /// Resets a failed analysis to `pending` and enqueues it, judging age
    /// against `now`.
    pub fn retry_at(
        &self,
        analysis_id: i64,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Analysis, RetryError> {
        let analysis = analysis_repo::find_for_owner(&self.db, analysis_id, owner_id)?
            .ok_or_else(|| {
                log::info!(
                    "Analysis {} not found for owner {}",
                    analysis_id,
                    owner_id
                );
                RetryError::NotFound
            })?;

        self.check_eligible(&analysis, now)?;

        if let Some(kind) = analysis.error_kind {
            log::info!(
                "Retrying analysis {} after {} failure ({})",
                analysis_id,
                kind,
                if kind.is_transient() {
                    "transient"
                } else {
                    "likely to recur"
                }
            );
        }

        let reset = self.db.with_transaction(|tx| {
            if !analysis_repo::reset_failed(tx, analysis_id)? {
                return Ok(None);
            }
            result_repo::delete_for_analysis(tx, analysis_id)?;
            analysis_repo::get(tx, analysis_id)
        })?;
        let Some(reset) = reset else {
            // Another retry won the compare-and-set.
            return Err(RetryError::NotFailed);
        };
        log::info!("Analysis {} reset for retry", analysis_id);

        self.queue.enqueue(AnalysisJob::new(analysis_id))?;
        Ok(reset)
    }

    fn check_eligible(&self, analysis: &Analysis, now: DateTime<Utc>) -> Result<(), RetryError> {
        if analysis.status != AnalysisStatus::Failed {
            return Err(RetryError::NotFailed);
        }
        let cutoff = days_before(now, self.window_days);
        if analysis.created_at < cutoff {
            return Err(RetryError::TooOld {
                window_days: self.window_days,
            });
        }
        if analysis.video.is_none() {
            return Err(RetryError::VideoGone);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FailureKind;
    use crate::db::analysis_repo::NewAnalysis;
    use chrono::Duration;
    use crate::worker::ChannelQueue;

    struct Fixture {
        db: Database,
        queue: Arc<ChannelQueue>,
        guard: RetryGuard,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let queue = Arc::new(ChannelQueue::new());
            let guard = RetryGuard::new(db.clone(), queue.clone(), 14);
            Self { db, queue, guard }
        }

        fn insert(&self, days_ago: i64, video: Option<&str>) -> i64 {
            self.db
                .with_conn(|conn| {
                    analysis_repo::insert(
                        conn,
                        &NewAnalysis {
                            owner_id: 1,
                            subject_ref: None,
                            description: "retry me".to_string(),
                            video: video.map(str::to_string),
                            thumbnail: Some("thumbnails/owner_1/t.jpg".to_string()),
                            created_at: Utc::now() - Duration::days(days_ago),
                        },
                    )
                })
                .unwrap()
                .id
        }

        fn failed(&self, days_ago: i64, video: Option<&str>) -> i64 {
            let id = self.insert(days_ago, video);
            analysis_repo::mark_failed(
                &self.db,
                id,
                FailureKind::ModelRequest,
                "Model request failed: no predictions returned",
            )
            .unwrap();
            id
        }
    }

    #[test]
    fn test_retry_resets_and_enqueues_once() {
        let fx = Fixture::new();
        let id = fx.failed(1, Some("videos/owner_1/a.mp4"));
        fx.db
            .with_conn(|c| {
                result_repo::insert_ranked(c, id, &[("ethanol".to_string(), 100.0)], Utc::now())
            })
            .unwrap();

        let analysis = fx.guard.retry(id, 1).unwrap();

        assert_eq!(analysis.status, AnalysisStatus::Pending);
        assert!(analysis.error_message.is_none());
        assert!(analysis.error_kind.is_none());
        assert!(analysis.completed_at.is_none());
        assert_eq!(analysis.description, "retry me");
        assert_eq!(analysis.video.as_deref(), Some("videos/owner_1/a.mp4"));
        assert_eq!(fx.queue.drain(), vec![AnalysisJob::new(id)]);
        let results = fx
            .db
            .with_conn(|c| result_repo::list_for_analysis(c, id))
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_foreign_or_missing_is_not_found() {
        let fx = Fixture::new();
        let id = fx.failed(1, Some("videos/owner_1/a.mp4"));
        assert!(matches!(fx.guard.retry(id, 2), Err(RetryError::NotFound)));
        assert!(matches!(fx.guard.retry(999, 1), Err(RetryError::NotFound)));
        assert_eq!(fx.queue.pending(), 0);
    }

    #[test]
    fn test_only_failed_can_retry() {
        let fx = Fixture::new();
        let id = fx.insert(1, Some("videos/owner_1/a.mp4"));
        assert!(matches!(fx.guard.retry(id, 1), Err(RetryError::NotFailed)));
    }

    #[test]
    fn test_too_old_names_window() {
        let fx = Fixture::new();
        let id = fx.failed(20, Some("videos/owner_1/a.mp4"));
        let err = fx.guard.retry(id, 1).unwrap_err();
        assert!(matches!(err, RetryError::TooOld { window_days: 14 }));
        assert_eq!(
            err.to_string(),
            "Analysis is too old to retry. Only analyses created within the last 14 days can be retried."
        );
    }

    #[test]
    fn test_age_checked_before_video() {
        let fx = Fixture::new();
        let id = fx.failed(20, None);
        assert!(matches!(
            fx.guard.retry(id, 1),
            Err(RetryError::TooOld { .. })
        ));
    }

    #[test]
    fn test_swept_video_cannot_retry() {
        let fx = Fixture::new();
        let id = fx.failed(1, None);
        let err = fx.guard.retry(id, 1).unwrap_err();
        assert!(matches!(err, RetryError::VideoGone));
        assert_eq!(
            err.to_string(),
            "Video file no longer exists. Cannot retry this analysis."
        );
    }

    #[test]
    fn test_second_retry_is_not_failed() {
        let fx = Fixture::new();
        let id = fx.failed(1, Some("videos/owner_1/a.mp4"));
        fx.guard.retry(id, 1).unwrap();
        assert!(matches!(fx.guard.retry(id, 1), Err(RetryError::NotFailed)));
        assert_eq!(fx.queue.pending(), 1);
    }

    #[test]
    fn test_huge_window_accepts_old_failures() {
        let fx = Fixture::new();
        let id = fx.failed(400, Some("videos/owner_1/a.mp4"));
        let guard = RetryGuard::new(fx.db.clone(), fx.queue.clone(), u32::MAX);

        assert!(guard.retry(id, 1).is_ok());
        assert_eq!(fx.queue.pending(), 1);
    }

    #[test]
    fn test_window_boundary_uses_now() {
        let fx = Fixture::new();
        let id = fx.failed(0, Some("videos/owner_1/a.mp4"));
        let created = analysis_repo::find_by_id(&fx.db, id)
            .unwrap()
            .unwrap()
            .created_at;

        let later = created + Duration::days(14) + Duration::seconds(1);
        assert!(matches!(
            fx.guard.retry_at(id, 1, later),
            Err(RetryError::TooOld { .. })
        ));
        assert!(fx.guard.retry_at(id, 1, created + Duration::days(14)).is_ok());
    }
}
