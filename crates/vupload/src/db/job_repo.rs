//! Job repository: CRUD operations for the `upload_jobs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw persisted job row. `record` holds the encoded job bytes.
#[derive(Debug, Clone)]
pub struct UploadJobRow {
    pub id: String,
    pub phase: String,
    pub record: Vec<u8>,
    pub created_at: String,
    pub updated_at: String,
}

impl UploadJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            phase: row.get("phase")?,
            record: row.get("record")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a row or replaces the record of an existing one. `created_at`
/// of an existing row is preserved.
pub fn upsert(db: &Database, job: &UploadJobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO upload_jobs (id, phase, record, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                phase = excluded.phase,
                record = excluded.record,
                updated_at = excluded.updated_at",
            params![
                job.id,
                job.phase,
                job.record,
                job.created_at,
                job.updated_at
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<UploadJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM upload_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], UploadJobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// All rows, oldest first.
pub fn list_all(db: &Database) -> Result<Vec<UploadJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM upload_jobs ORDER BY created_at ASC, id ASC")?;
        let rows = stmt
            .query_map([], UploadJobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a row. Returns whether it existed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute("DELETE FROM upload_jobs WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM upload_jobs", [], |r| r.get(0))?;
        Ok(count.max(0) as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(id: &str, created_at: &str) -> UploadJobRow {
        UploadJobRow {
            id: id.to_string(),
            phase: "create".to_string(),
            record: br#"{"schema_version":1}"#.to_vec(),
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_upsert_and_find() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &make_row("j1", "2026-01-01T00:00:00Z")).unwrap();

        let row = find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.phase, "create");
        assert_eq!(row.record, br#"{"schema_version":1}"#.to_vec());
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_keeps_created_at() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &make_row("j1", "2026-01-01T00:00:00Z")).unwrap();

        let mut updated = make_row("j1", "2026-02-01T00:00:00Z");
        updated.phase = "upload".to_string();
        upsert(&db, &updated).unwrap();

        let row = find_by_id(&db, "j1").unwrap().unwrap();
        assert_eq!(row.phase, "upload");
        assert_eq!(row.created_at, "2026-01-01T00:00:00Z");
        assert_eq!(row.updated_at, "2026-02-01T00:00:00Z");
        assert_eq!(count(&db).unwrap(), 1);
    }

    #[test]
    fn test_list_all_ordered() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &make_row("late", "2026-03-01T00:00:00Z")).unwrap();
        upsert(&db, &make_row("early", "2026-01-01T00:00:00Z")).unwrap();

        let ids: Vec<String> = list_all(&db).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_delete() {
        let db = Database::open_in_memory().unwrap();
        upsert(&db, &make_row("j1", "2026-01-01T00:00:00Z")).unwrap();

        assert!(delete(&db, "j1").unwrap());
        assert!(!delete(&db, "j1").unwrap());
        assert_eq!(count(&db).unwrap(), 0);
    }
}
