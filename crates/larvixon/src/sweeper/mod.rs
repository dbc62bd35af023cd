//! Retention sweeper: drops video assets once analyses age past the
//! retention window. Thumbnails and results are kept.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::days_before;
use crate::db::{analysis_repo, Database, DatabaseError};
use crate::storage::AssetManager;

pub mod scheduler;

pub use scheduler::SweepScheduler;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Analyses whose video reference was cleared.
    pub pruned: usize,
    /// `(analysis id, error)` for assets that could not be deleted.
    pub failures: Vec<(i64, String)>,
}

pub struct RetentionSweeper {
    db: Database,
    assets: Arc<AssetManager>,
    lifetime_days: u32,
}

impl RetentionSweeper {
    pub fn new(db: Database, assets: Arc<AssetManager>, lifetime_days: u32) -> Self {
        Self {
            db,
            assets,
            lifetime_days,
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        days_before(now, self.lifetime_days)
    }

    /// Deletes expired videos and clears their references. Asset deletion
    /// is best-effort; the reference is cleared either way.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, DatabaseError> {
        let _span = tracing::info_span!("retention_sweep", lifetime_days = self.lifetime_days)
            .entered();
        log::info!(
            "Pruning video files older than {} days",
            self.lifetime_days
        );

        let expired = analysis_repo::list_expired_videos(&self.db, self.cutoff(now))?;
        let mut report = SweepReport::default();

        for (id, key) in &expired {
            if let Err(e) = self.assets.delete(key) {
                log::error!("Error deleting video for analysis {}: {}", id, e);
                report.failures.push((*id, e.to_string()));
            }
        }

        let ids: Vec<i64> = expired.iter().map(|(id, _)| *id).collect();
        report.pruned = analysis_repo::clear_videos(&self.db, &ids)?;

        if report.pruned > 0 {
            log::info!(
                "Successfully pruned video files for {} analyses",
                report.pruned
            );
        } else {
            log::info!("No old analyses found for video pruning");
        }
        Ok(report)
    }
}
