//! Analysis repository: reads and state transitions for the `analyses` table.
//!
//! Functions that take a `&Connection` compose inside a caller's
//! transaction (`Transaction` derefs to `Connection`); the rest take the
//! shared `&Database`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::analysis::{Analysis, AnalysisStatus, FailureKind};

const SELECT_COLUMNS: &str = "id, owner_id, subject_ref, description, video, thumbnail, status,
     error_message, error_kind, created_at, completed_at";

/// A raw analysis row from the database.
#[derive(Debug, Clone)]
struct AnalysisRow {
    id: i64,
    owner_id: i64,
    subject_ref: Option<String>,
    description: String,
    video: Option<String>,
    thumbnail: Option<String>,
    status: String,
    error_message: Option<String>,
    error_kind: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl AnalysisRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            subject_ref: row.get("subject_ref")?,
            description: row.get("description")?,
            video: row.get("video")?,
            thumbnail: row.get("thumbnail")?,
            status: row.get("status")?,
            error_message: row.get("error_message")?,
            error_kind: row.get("error_kind")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn into_analysis(self) -> Result<Analysis, DatabaseError> {
        let status = self
            .status
            .parse::<AnalysisStatus>()
            .map_err(|_| DatabaseError::CorruptValue {
                column: "status",
                value: self.status.clone(),
            })?;
        let error_kind = self
            .error_kind
            .map(|k| {
                k.parse::<FailureKind>()
                    .map_err(|_| DatabaseError::CorruptValue {
                        column: "error_kind",
                        value: k.clone(),
                    })
            })
            .transpose()?;
        let subject_ref = self
            .subject_ref
            .map(|s| {
                Uuid::parse_str(&s).map_err(|_| DatabaseError::CorruptValue {
                    column: "subject_ref",
                    value: s.clone(),
                })
            })
            .transpose()?;
        let completed_at = self
            .completed_at
            .map(|s| parse_timestamp("completed_at", &s))
            .transpose()?;

        Ok(Analysis {
            id: self.id,
            owner_id: self.owner_id,
            subject_ref,
            description: self.description,
            video: self.video,
            thumbnail: self.thumbnail,
            status,
            error_message: self.error_message,
            error_kind,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            completed_at,
        })
    }
}

/// Fields supplied when an analysis is first recorded.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub owner_id: i64,
    pub subject_ref: Option<Uuid>,
    pub description: String,
    pub video: Option<String>,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Inserts a new `pending` analysis and returns the stored record.
pub fn insert(conn: &Connection, new: &NewAnalysis) -> Result<Analysis, DatabaseError> {
    conn.execute(
        "INSERT INTO analyses (owner_id, subject_ref, description, video, thumbnail, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new.owner_id,
            new.subject_ref.map(|u| u.to_string()),
            new.description,
            new.video,
            new.thumbnail,
            AnalysisStatus::Pending.as_str(),
            format_timestamp(new.created_at),
        ],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
}

/// Loads an analysis by id on an existing connection.
pub fn get(conn: &Connection, id: i64) -> Result<Option<Analysis>, DatabaseError> {
    let sql = format!("SELECT {} FROM analyses WHERE id = ?1", SELECT_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], AnalysisRow::from_row)
        .optional()?;
    row.map(AnalysisRow::into_analysis).transpose()
}

/// Finds an analysis by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Analysis>, DatabaseError> {
    db.with_conn(|conn| get(conn, id))
}

/// Finds an analysis by id, scoped to its owner. A foreign row is `None`.
pub fn find_for_owner(
    db: &Database,
    id: i64,
    owner_id: i64,
) -> Result<Option<Analysis>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM analyses WHERE id = ?1 AND owner_id = ?2",
            SELECT_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![id, owner_id], AnalysisRow::from_row)
            .optional()?;
        row.map(AnalysisRow::into_analysis).transpose()
    })
}

/// Moves a `pending` analysis into `processing`. A row already
/// `processing` is re-entered after a redelivered job. Terminal rows are
/// left alone; returns whether a row changed.
pub fn mark_processing(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE analyses SET status = 'processing'
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id],
        )?;
        Ok(changed > 0)
    })
}

/// Marks an analysis `completed` at `at`.
pub fn mark_completed(
    conn: &Connection,
    id: i64,
    at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE analyses SET status = 'completed', completed_at = ?2,
         error_message = NULL, error_kind = NULL
         WHERE id = ?1",
        params![id, format_timestamp(at)],
    )?;
    Ok(changed > 0)
}

/// Marks an analysis `failed` with a message and kind.
pub fn mark_failed(
    db: &Database,
    id: i64,
    kind: FailureKind,
    message: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE analyses SET status = 'failed', error_message = ?2, error_kind = ?3,
             completed_at = NULL
             WHERE id = ?1 AND status != 'completed'",
            params![id, message, kind.as_str()],
        )?;
        Ok(changed > 0)
    })
}

/// Resets a failed analysis to `pending`, clearing error and completion
/// fields. Compare-and-set on `status = 'failed'`: returns `false` when
/// another caller got there first.
pub fn reset_failed(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE analyses SET status = 'pending', error_message = NULL, error_kind = NULL,
         completed_at = NULL
         WHERE id = ?1 AND status = 'failed'",
        params![id],
    )?;
    Ok(changed > 0)
}

/// Ids of analyses not yet finished (`pending` or `processing`), oldest
/// first.
pub fn list_unfinished_ids(db: &Database) -> Result<Vec<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM analyses WHERE status IN ('pending', 'processing')
             ORDER BY created_at ASC, id ASC",
        )?;
        let ids = stmt
            .query_map([], |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

/// `(id, video key)` for every analysis created at or before `cutoff` that
/// still holds a video.
pub fn list_expired_videos(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<(i64, String)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, video FROM analyses
             WHERE created_at <= ?1 AND video IS NOT NULL
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![format_timestamp(cutoff)], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Clears the video reference on exactly the given ids. Returns rows changed.
pub fn clear_videos(db: &Database, ids: &[i64]) -> Result<usize, DatabaseError> {
    if ids.is_empty() {
        return Ok(0);
    }
    db.with_transaction(|tx| {
        let mut stmt = tx.prepare("UPDATE analyses SET video = NULL WHERE id = ?1")?;
        let mut changed = 0;
        for id in ids {
            changed += stmt.execute(params![id])?;
        }
        Ok(changed)
    })
}

/// Deletes an analysis owned by `owner_id`, returning the deleted record.
/// Results go with it through the cascade.
pub fn delete_for_owner(
    db: &Database,
    id: i64,
    owner_id: i64,
) -> Result<Option<Analysis>, DatabaseError> {
    db.with_transaction(|tx| {
        let sql = format!(
            "SELECT {} FROM analyses WHERE id = ?1 AND owner_id = ?2",
            SELECT_COLUMNS
        );
        let row = tx
            .query_row(&sql, params![id, owner_id], AnalysisRow::from_row)
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };
        let analysis = row.into_analysis()?;
        tx.execute("DELETE FROM analyses WHERE id = ?1", params![id])?;
        Ok(Some(analysis))
    })
}

/// Counts all analyses.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let n: u64 = conn.query_row("SELECT COUNT(*) FROM analyses", [], |r| r.get(0))?;
        Ok(n)
    })
}
