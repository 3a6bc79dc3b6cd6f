//! SQLite persistence for progress, authored trees and the catalog.

use chrono::Utc;
use course_core::{
    CatalogEntry, CatalogStore, CourseTree, ProgressStore, StorageError, StorageResult, UserProgress,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt tree {id}: {reason}")]
    CorruptTree { id: String, reason: String },
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for StorageError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Json(e) => StorageError::Json(e),
            DbError::CorruptTree { id, reason } => StorageError::corrupt(format!("tree {}", id), reason),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Database connection wrapper. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at path.
    pub fn open(path: &Path) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Create in-memory database (for testing).
    pub fn in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                user_id TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trees (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS catalog (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                body TEXT NOT NULL,
                published_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    pub fn progress_store(&self) -> SqliteProgressStore {
        SqliteProgressStore { db: self.clone() }
    }

    pub fn catalog_store(&self) -> SqliteCatalogStore {
        SqliteCatalogStore { db: self.clone() }
    }

    /// Insert or replace an authored tree.
    pub fn save_tree(&self, tree: &CourseTree) -> DbResult<()> {
        let body = serde_json::to_string(tree)?;
        self.conn()?.execute(
            r#"
            INSERT INTO trees (id, title, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
            params![tree.id, tree.title, body, tree.updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// All authored trees, oldest first by title.
    pub fn list_trees(&self) -> DbResult<Vec<CourseTree>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, body FROM trees ORDER BY title, id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, body)| {
                serde_json::from_str(&body).map_err(|e| DbError::CorruptTree {
                    id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    pub fn tree_count(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM trees", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// [`ProgressStore`] keeping one JSON snapshot per user.
#[derive(Debug, Clone)]
pub struct SqliteProgressStore {
    db: Database,
}

impl ProgressStore for SqliteProgressStore {
    fn load(&self, user_id: &str) -> StorageResult<UserProgress> {
        let raw: Option<String> = self
            .db
            .conn()?
            .query_row(
                "SELECT snapshot FROM progress WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)?;

        match raw {
            None => Ok(UserProgress::default()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::corrupt(format!("progress for {}", user_id), e)),
        }
    }

    fn save(&self, user_id: &str, progress: &UserProgress) -> StorageResult<()> {
        let snapshot = serde_json::to_string(progress)?;
        self.db
            .conn()?
            .execute(
                r#"
                INSERT INTO progress (user_id, snapshot, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id) DO UPDATE SET
                    snapshot = excluded.snapshot,
                    updated_at = excluded.updated_at
                "#,
                params![user_id, snapshot, Utc::now().to_rfc3339()],
            )
            .map_err(DbError::from)?;
        Ok(())
    }

    fn clear(&self, user_id: &str) -> StorageResult<()> {
        self.db
            .conn()?
            .execute("DELETE FROM progress WHERE user_id = ?1", params![user_id])
            .map_err(DbError::from)?;
        Ok(())
    }
}

/// [`CatalogStore`] with the version check done inside one transaction.
#[derive(Debug, Clone)]
pub struct SqliteCatalogStore {
    db: Database,
}

fn stored_version(conn: &Connection, id: &str) -> DbResult<Option<u32>> {
    Ok(conn
        .query_row("SELECT version FROM catalog WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?)
}

fn decode_entry(id: &str, body: &str) -> StorageResult<CatalogEntry> {
    serde_json::from_str(body).map_err(|e| StorageError::corrupt(format!("catalog entry {}", id), e))
}

impl CatalogStore for SqliteCatalogStore {
    fn get(&self, id: &str) -> StorageResult<Option<CatalogEntry>> {
        let body: Option<String> = self
            .db
            .conn()?
            .query_row("SELECT body FROM catalog WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(DbError::from)?;
        body.map(|b| decode_entry(id, &b)).transpose()
    }

    fn put(&self, entry: &CatalogEntry, expected_version: Option<u32>) -> StorageResult<()> {
        let body = serde_json::to_string(entry)?;
        let mut conn = self.db.conn()?;
        let tx = conn.transaction().map_err(DbError::from)?;

        let found = stored_version(&tx, entry.id())?;
        if found != expected_version {
            return Err(StorageError::Conflict {
                id: entry.id().to_string(),
                expected: expected_version,
                found,
            });
        }

        tx.execute(
            r#"
            INSERT INTO catalog (id, version, body, published_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                body = excluded.body,
                published_at = excluded.published_at
            "#,
            params![entry.id(), entry.version(), body, entry.published_at.to_rfc3339()],
        )
        .map_err(DbError::from)?;
        tx.commit().map_err(DbError::from)?;
        Ok(())
    }

    fn remove(&self, id: &str, expected_version: u32) -> StorageResult<()> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction().map_err(DbError::from)?;

        let found = stored_version(&tx, id)?;
        if found != Some(expected_version) {
            return Err(StorageError::Conflict {
                id: id.to_string(),
                expected: Some(expected_version),
                found,
            });
        }

        tx.execute("DELETE FROM catalog WHERE id = ?1", params![id])
            .map_err(DbError::from)?;
        tx.commit().map_err(DbError::from)?;
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<CatalogEntry>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, body FROM catalog ORDER BY published_at DESC, id")
            .map_err(DbError::from)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(DbError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)?;

        rows.iter().map(|(id, body)| decode_entry(id, body)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::tree::{prepare_entry, publish, unpublish};
    use course_core::{MasteryTracker, MemoryProgressStore, Session, Tier, ValidationOptions};
    use course_testing::{generators, Fixtures};
    use proptest::prelude::*;

    #[test]
    fn test_progress_roundtrip_and_clear() {
        let db = Database::in_memory().unwrap();
        let tracker = MasteryTracker::new(db.progress_store());

        for lesson in ["a", "b", "c"] {
            tracker
                .record_session("u1", "counting", &Session::at(Fixtures::day(1)).completed().lesson(lesson))
                .unwrap();
        }
        assert_eq!(tracker.tier("u1", "counting").unwrap(), Tier::Gold);
        assert!(tracker.progress("u1").unwrap().has_completed("b"));

        tracker.clear("u1").unwrap();
        assert!(tracker.progress("u1").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_progress_is_an_error() {
        let db = Database::in_memory().unwrap();
        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO progress (user_id, snapshot, updated_at) VALUES ('u1', '{oops', '')",
                [],
            )
            .unwrap();
        let err = db.progress_store().load("u1").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_trees_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courses.db");
        let tree = Fixtures::course_tree();
        {
            let db = Database::open(&path).unwrap();
            db.save_tree(&tree).unwrap();
            db.save_tree(&tree).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.tree_count().unwrap(), 1);
        assert_eq!(db.list_trees().unwrap(), vec![tree.clone()]);
    }

    #[test]
    fn test_publish_through_sqlite_catalog() {
        let db = Database::in_memory().unwrap();
        let store = db.catalog_store();
        let tree = Fixtures::course_tree();
        let concepts = Fixtures::concept_graph();
        let options = ValidationOptions::default();

        let first = publish(&tree, &concepts, &options, &store).unwrap();
        let second = publish(&tree, &concepts, &options, &store).unwrap();
        assert_eq!(first.version(), 1);
        assert_eq!(second.version(), 2);
        assert_eq!(second.tree.created_at, first.tree.created_at);
        assert_eq!(store.list().unwrap().len(), 1);

        let removed = unpublish(&tree.id, &store).unwrap();
        assert_eq!(removed.map(|e| e.version()), Some(2));
        assert!(store.get(&tree.id).unwrap().is_none());
    }

    #[test]
    fn test_stale_version_conflicts() {
        let db = Database::in_memory().unwrap();
        let store = db.catalog_store();
        let tree = Fixtures::course_tree();

        let v1 = prepare_entry(&tree, None, Utc::now());
        store.put(&v1, None).unwrap();

        // a second writer that never saw v1
        let err = store.put(&v1, None).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Conflict {
                expected: None,
                found: Some(1),
                ..
            }
        ));

        let err = store.remove(&tree.id, 7).unwrap_err();
        assert!(err.is_conflict());
    }

    proptest! {
        #[test]
        fn test_sqlite_progress_matches_memory(history in generators::session_history(12, 20)) {
            let db = Database::in_memory().unwrap();
            let sqlite = MasteryTracker::new(db.progress_store());
            let memory = MasteryTracker::new(MemoryProgressStore::new());

            for (i, session) in history.iter().enumerate() {
                let concept = if i % 3 == 0 { "counting" } else { "addition" };
                let a = sqlite.record_session("u1", concept, session).unwrap();
                let b = memory.record_session("u1", concept, session).unwrap();
                prop_assert_eq!(a, b);
            }
            prop_assert_eq!(sqlite.progress("u1").unwrap(), memory.progress("u1").unwrap());
        }
    }
}
