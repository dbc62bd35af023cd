//! Analysis result repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_timestamp, parse_timestamp, substance_repo, DatabaseError};
use crate::analysis::AnalysisResult;

struct ResultRow {
    id: i64,
    analysis_id: i64,
    substance_id: i64,
    substance: String,
    confidence_score: f64,
    detected_at: String,
}

impl ResultRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            analysis_id: row.get("analysis_id")?,
            substance_id: row.get("substance_id")?,
            substance: row.get("name_en")?,
            confidence_score: row.get("confidence_score")?,
            detected_at: row.get("detected_at")?,
        })
    }

    fn into_result(self) -> Result<AnalysisResult, DatabaseError> {
        Ok(AnalysisResult {
            id: self.id,
            analysis_id: self.analysis_id,
            substance_id: self.substance_id,
            substance: self.substance,
            confidence_score: self.confidence_score,
            detected_at: parse_timestamp("detected_at", &self.detected_at)?,
        })
    }
}

/// Inserts one result per `(substance, score)` pair in the given order,
/// creating substances as needed.
pub fn insert_ranked(
    conn: &Connection,
    analysis_id: i64,
    ranked: &[(String, f64)],
    detected_at: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let detected_at = format_timestamp(detected_at);
    let mut stmt = conn.prepare(
        "INSERT INTO analysis_results (analysis_id, substance_id, confidence_score, detected_at)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (name, score) in ranked {
        let substance = substance_repo::get_or_create(conn, name)?;
        stmt.execute(params![analysis_id, substance.id, score, detected_at])?;
    }
    Ok(ranked.len())
}

/// Results of one analysis, highest confidence first.
pub fn list_for_analysis(
    conn: &Connection,
    analysis_id: i64,
) -> Result<Vec<AnalysisResult>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.analysis_id, r.substance_id, s.name_en, r.confidence_score, r.detected_at
         FROM analysis_results r
         JOIN substances s ON s.id = r.substance_id
         WHERE r.analysis_id = ?1
         ORDER BY r.confidence_score DESC, r.id ASC",
    )?;
    let rows = stmt
        .query_map(params![analysis_id], ResultRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(ResultRow::into_result).collect()
}

/// Deletes every result of an analysis. Returns rows removed.
pub fn delete_for_analysis(conn: &Connection, analysis_id: i64) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM analysis_results WHERE analysis_id = ?1",
        params![analysis_id],
    )?;
    Ok(removed)
}
