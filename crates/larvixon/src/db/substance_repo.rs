//! Substance repository: lookup, lazy creation and catalogue seeding.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::analysis::Substance;

fn substance_from_row(row: &Row<'_>) -> Result<Substance, rusqlite::Error> {
    Ok(Substance {
        id: row.get("id")?,
        name_en: row.get("name_en")?,
        name_pl: row.get("name_pl")?,
    })
}

/// Looks up a substance by English name, creating it when absent.
pub fn get_or_create(conn: &Connection, name_en: &str) -> Result<Substance, DatabaseError> {
    conn.execute(
        "INSERT INTO substances (name_en) VALUES (?1) ON CONFLICT(name_en) DO NOTHING",
        params![name_en],
    )?;
    let substance = conn.query_row(
        "SELECT id, name_en, name_pl FROM substances WHERE name_en = ?1",
        params![name_en],
        substance_from_row,
    )?;
    Ok(substance)
}

/// Finds a substance by English name.
pub fn find_by_name(db: &Database, name_en: &str) -> Result<Option<Substance>, DatabaseError> {
    db.with_conn(|conn| {
        let substance = conn
            .query_row(
                "SELECT id, name_en, name_pl FROM substances WHERE name_en = ?1",
                params![name_en],
                substance_from_row,
            )
            .optional()?;
        Ok(substance)
    })
}

/// Upserts `(english, polish)` pairs. Existing rows keep their id and get
/// the Polish name refreshed. Returns the number of pairs written.
pub fn seed(db: &Database, catalogue: &[(&str, &str)]) -> Result<usize, DatabaseError> {
    db.with_transaction(|tx| {
        let mut stmt = tx.prepare(
            "INSERT INTO substances (name_en, name_pl) VALUES (?1, ?2)
             ON CONFLICT(name_en) DO UPDATE SET name_pl = excluded.name_pl",
        )?;
        for (name_en, name_pl) in catalogue {
            stmt.execute(params![name_en, name_pl])?;
        }
        Ok(catalogue.len())
    })
}

/// Lists all substances ordered by English name.
pub fn list(db: &Database) -> Result<Vec<Substance>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT id, name_en, name_pl FROM substances ORDER BY name_en ASC")?;
        let rows = stmt
            .query_map([], substance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
