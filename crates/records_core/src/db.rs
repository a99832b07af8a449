use crate::clock;
use crate::error::StoreError;
use crate::schema::{AchievementReference, AchievementStatus, HistoryEntry};
use crate::store::{HistoryLedger, ReferenceStore};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use time::OffsetDateTime;

pub fn open(db_path: impl AsRef<Path>) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    init(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

/// Creates the reference table and the history ledger if missing.
pub fn init(conn: &Connection) -> Result<(), StoreError> {
    init_references(conn)?;
    init_history(conn)?;
    Ok(())
}

fn init_references(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS achievement_references (
          id TEXT PRIMARY KEY,
          student_id TEXT NOT NULL,
          document_ref TEXT,
          status TEXT NOT NULL
            CHECK (status IN ('draft', 'submitted', 'verified', 'rejected')),
          submitted_at_ms INTEGER,
          verified_at_ms INTEGER,
          verified_by TEXT,
          rejection_note TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER,
          revision INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_achievement_references_student
          ON achievement_references(student_id, created_at_ms);
        "#,
    )?;
    Ok(())
}

// No foreign key: history outlives deleted references.
fn init_history(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS achievement_reference_history (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          id TEXT NOT NULL UNIQUE,
          achievement_ref_id TEXT NOT NULL,
          old_status TEXT NOT NULL,
          new_status TEXT NOT NULL,
          changed_by TEXT,
          note TEXT,
          changed_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_achievement_reference_history_ref
          ON achievement_reference_history(achievement_ref_id, changed_at_ms);
        "#,
    )?;
    Ok(())
}

const REFERENCE_COLUMNS: &str = "id, student_id, document_ref, status, submitted_at_ms, \
     verified_at_ms, verified_by, rejection_note, created_at_ms, updated_at_ms, revision";

fn reference_from_row(row: &Row<'_>) -> rusqlite::Result<AchievementReference> {
    Ok(AchievementReference {
        id: row.get(0)?,
        student_id: row.get(1)?,
        document_ref: row.get(2)?,
        status: status_at(row, 3)?,
        submitted_at: opt_time_at(row, 4)?,
        verified_at: opt_time_at(row, 5)?,
        verified_by: row.get(6)?,
        rejection_note: row.get(7)?,
        created_at: time_at(row, 8)?,
        updated_at: opt_time_at(row, 9)?,
        revision: row.get(10)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get(0)?,
        achievement_ref_id: row.get(1)?,
        old_status: status_at(row, 2)?,
        new_status: status_at(row, 3)?,
        changed_by: row.get(4)?,
        note: row.get(5)?,
        changed_at: time_at(row, 6)?,
    })
}

fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<AchievementStatus> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let ms: i64 = row.get(idx)?;
    clock::from_millis(ms)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(err)))
}

fn opt_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    let ms: Option<i64> = row.get(idx)?;
    ms.map(|ms| {
        clock::from_millis(ms).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(err))
        })
    })
    .transpose()
}

/// Resolves a zero-row conditional update into the reason it matched nothing.
fn check_updated(
    conn: &Connection,
    id: &str,
    changed: usize,
    expected_revision: i64,
) -> Result<(), StoreError> {
    if changed > 0 {
        return Ok(());
    }
    let actual: Option<i64> = conn
        .query_row(
            "SELECT revision FROM achievement_references WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match actual {
        Some(actual) => Err(StoreError::RevisionMismatch {
            expected: expected_revision,
            actual,
        }),
        None => Err(StoreError::UnknownId),
    }
}

/// SQLite-backed reference store and history ledger sharing one connection.
///
/// Statements run on tokio's blocking pool so async callers never hold the
/// executor while SQLite works.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(open(db_path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(open_in_memory()?))
    }

    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await?
    }
}

#[async_trait]
impl ReferenceStore for SqliteStore {
    async fn insert(&self, reference: &AchievementReference) -> Result<(), StoreError> {
        let r = reference.clone();
        self.call(move |conn| {
            conn.execute(
                r#"
                INSERT INTO achievement_references (
                  id, student_id, document_ref, status, submitted_at_ms, verified_at_ms,
                  verified_by, rejection_note, created_at_ms, updated_at_ms, revision
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    r.id,
                    r.student_id,
                    r.document_ref,
                    r.status.as_str(),
                    r.submitted_at.map(clock::to_millis),
                    r.verified_at.map(clock::to_millis),
                    r.verified_by,
                    r.rejection_note,
                    clock::to_millis(r.created_at),
                    r.updated_at.map(clock::to_millis),
                    r.revision
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find(&self, id: &str) -> Result<Option<AchievementReference>, StoreError> {
        let id = id.to_string();
        self.call(move |conn| {
            let sql = format!("SELECT {REFERENCE_COLUMNS} FROM achievement_references WHERE id = ?1");
            Ok(conn
                .query_row(&sql, params![id], reference_from_row)
                .optional()?)
        })
        .await
    }

    async fn list(&self, student_id: Option<&str>) -> Result<Vec<AchievementReference>, StoreError> {
        let student_id = student_id.map(str::to_string);
        self.call(move |conn| {
            let sql = format!(
                "SELECT {REFERENCE_COLUMNS} FROM achievement_references \
                 WHERE (?1 IS NULL OR student_id = ?1) \
                 ORDER BY created_at_ms DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![student_id], reference_from_row)?;

            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
        .await
    }

    async fn update_status(
        &self,
        next: &AchievementReference,
        expected_revision: i64,
    ) -> Result<(), StoreError> {
        let next = next.clone();
        self.call(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE achievement_references SET
                  status = ?1,
                  submitted_at_ms = ?2,
                  verified_at_ms = ?3,
                  verified_by = ?4,
                  rejection_note = ?5,
                  updated_at_ms = ?6,
                  revision = revision + 1
                WHERE id = ?7 AND revision = ?8
                "#,
                params![
                    next.status.as_str(),
                    next.submitted_at.map(clock::to_millis),
                    next.verified_at.map(clock::to_millis),
                    next.verified_by,
                    next.rejection_note,
                    next.updated_at.map(clock::to_millis),
                    next.id,
                    expected_revision
                ],
            )?;
            check_updated(conn, &next.id, changed, expected_revision)
        })
        .await
    }

    async fn update_document_ref(
        &self,
        id: &str,
        document_ref: &str,
        updated_at: OffsetDateTime,
        expected_revision: i64,
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        let document_ref = document_ref.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                r#"
                UPDATE achievement_references SET
                  document_ref = ?1,
                  updated_at_ms = ?2,
                  revision = revision + 1
                WHERE id = ?3 AND revision = ?4
                "#,
                params![
                    document_ref,
                    clock::to_millis(updated_at),
                    id,
                    expected_revision
                ],
            )?;
            check_updated(conn, &id, changed, expected_revision)
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.call(move |conn| {
            let removed = conn.execute(
                "DELETE FROM achievement_references WHERE id = ?1",
                params![id],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}

#[async_trait]
impl HistoryLedger for SqliteStore {
    async fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let e = entry.clone();
        self.call(move |conn| {
            conn.execute(
                r#"
                INSERT INTO achievement_reference_history (
                  id, achievement_ref_id, old_status, new_status, changed_by, note, changed_at_ms
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    e.id,
                    e.achievement_ref_id,
                    e.old_status.as_str(),
                    e.new_status.as_str(),
                    e.changed_by,
                    e.note,
                    clock::to_millis(e.changed_at)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn entries(&self, achievement_ref_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let ref_id = achievement_ref_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, achievement_ref_id, old_status, new_status, changed_by, note, changed_at_ms
                FROM achievement_reference_history
                WHERE achievement_ref_id = ?1
                ORDER BY changed_at_ms DESC, seq DESC
                "#,
            )?;
            let rows = stmt.query_map(params![ref_id], history_from_row)?;

            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
        .await
    }
}
