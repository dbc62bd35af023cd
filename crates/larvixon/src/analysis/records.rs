//! Owner-scoped reads and deletes of analyses.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::{Analysis, AnalysisResult};
use crate::db::{analysis_repo, result_repo, Database, DatabaseError};
use crate::storage::AssetManager;

#[derive(Error, Debug)]
pub enum RecordsError {
    #[error("Analysis not found or you do not have permission to access it.")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// An analysis together with its results, highest confidence first.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisDetail {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub results: Vec<AnalysisResult>,
}

pub struct AnalysisRecords {
    db: Database,
    assets: Arc<AssetManager>,
}

impl AnalysisRecords {
    pub fn new(db: Database, assets: Arc<AssetManager>) -> Self {
        Self { db, assets }
    }

    pub fn get_for_owner(&self, id: i64, owner_id: i64) -> Result<AnalysisDetail, RecordsError> {
        let analysis =
            analysis_repo::find_for_owner(&self.db, id, owner_id)?.ok_or(RecordsError::NotFound)?;
        let results = self
            .db
            .with_conn(|conn| result_repo::list_for_analysis(conn, id))?;
        Ok(AnalysisDetail { analysis, results })
    }

    /// Deletes the analysis and its results, then its stored assets.
    /// Asset removal is best-effort.
    pub fn delete_for_owner(&self, id: i64, owner_id: i64) -> Result<Analysis, RecordsError> {
        let analysis = analysis_repo::delete_for_owner(&self.db, id, owner_id)?
            .ok_or(RecordsError::NotFound)?;

        for key in [&analysis.video, &analysis.thumbnail].into_iter().flatten() {
            if let Err(e) = self.assets.delete(key) {
                log::warn!("Failed to delete asset of analysis {}: {}", id, e);
            }
        }
        log::info!("Deleted analysis {}", id);
        Ok(analysis)
    }
}
