//! SQLite entity storage - the single-node versioned backend
//!
//! One row per live entity keyed by `key`. Every batch runs in one
//! transaction guarded by the version each writer observed; any stale write
//! rolls the whole batch back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::backup::backup_once;
use super::write_plan::prepare_batch;
use crate::application::ports::outbound::{
    DocumentBatch, EntityStorage, StorageError, StoredRecord,
};
use crate::domain::value_objects::{EntityKey, Gid};

type Row = (String, Option<i64>, i64, String);

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn record_from_row((key, gid, version, serialized): Row) -> Result<StoredRecord, StorageError> {
    Ok(StoredRecord {
        key: EntityKey::from(key),
        gid: gid.map(Gid::new),
        version: version as u64,
        document: serde_json::from_str(&serialized)?,
    })
}

pub struct SqliteEntityStorage {
    pool: SqlitePool,
    path: PathBuf,
    read_only: bool,
    /// Only one write batch in flight per store
    write_lock: Mutex<()>,
}

impl SqliteEntityStorage {
    /// Open for reading and writing, backing up the existing file first
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        backup_once(&path).await?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self {
            pool,
            path,
            read_only: false,
            write_lock: Mutex::new(()),
        };
        storage.initialize_schema().await?;
        info!(path = %storage.path.display(), "Opened entity store");
        Ok(storage)
    }

    /// Open an existing store without write access; never copies the file
    pub async fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        info!(path = %path.display(), "Opened entity store (read-only)");
        Ok(Self {
            pool,
            path,
            read_only: true,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                key TEXT PRIMARY KEY,
                gid INTEGER,
                version INTEGER NOT NULL,
                serialized TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_gid ON entities(gid)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        // Highest gid ever handed out; survives deletes so gids are never reused
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gid_high_water (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_gid INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT OR IGNORE INTO gid_high_water (id, last_gid) SELECT 1, COALESCE(MAX(gid), 0) FROM entities",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl EntityStorage for SqliteEntityStorage {
    async fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    #[instrument(skip(self, diffs), fields(path = %self.path.display(), batch = diffs.len()))]
    async fn update(&self, diffs: DocumentBatch) -> Result<DocumentBatch, StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.path.display().to_string()));
        }
        let prepared = prepare_batch(diffs)?;

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut written = DocumentBatch::new();

        for mut write in prepared {
            if write.destroyed {
                if write.is_insert() {
                    debug!(key = %write.key, "Skipping tombstone of never-persisted entity");
                    continue;
                }
                let result = sqlx::query("DELETE FROM entities WHERE key = ? AND version = ?")
                    .bind(write.key.as_str())
                    .bind(write.observed as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                if result.rows_affected() != 1 {
                    tx.rollback().await.map_err(db_err)?;
                    warn!(key = %write.key, observed = write.observed, "Stale delete rejected");
                    return Err(write.conflict());
                }
            } else if write.is_insert() {
                match write.gid {
                    None => {
                        let next: i64 = sqlx::query_scalar(
                            "UPDATE gid_high_water SET last_gid = last_gid + 1 WHERE id = 1 RETURNING last_gid",
                        )
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(db_err)?;
                        write.assign_gid(Gid::new(next));
                    }
                    // Gid assigned elsewhere (e.g. by a fan-out primary)
                    Some(gid) => {
                        sqlx::query(
                            "UPDATE gid_high_water SET last_gid = MAX(last_gid, ?) WHERE id = 1",
                        )
                        .bind(gid.value())
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;
                    }
                }
                let result = sqlx::query(
                    "INSERT INTO entities (key, gid, version, serialized) VALUES (?, ?, ?, ?)",
                )
                .bind(write.key.as_str())
                .bind(write.gid.map(|g| g.value()))
                .bind(write.next_version as i64)
                .bind(write.serialized()?)
                .execute(&mut *tx)
                .await;
                match result {
                    Ok(_) => {}
                    Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                        tx.rollback().await.map_err(db_err)?;
                        warn!(key = %write.key, "Insert of an existing key rejected");
                        return Err(write.conflict());
                    }
                    Err(e) => return Err(db_err(e)),
                }
            } else {
                let result = sqlx::query(
                    "UPDATE entities SET version = ?, gid = ?, serialized = ? WHERE key = ? AND version = ?",
                )
                .bind(write.next_version as i64)
                .bind(write.gid.map(|g| g.value()))
                .bind(write.serialized()?)
                .bind(write.key.as_str())
                .bind(write.observed as i64)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                if result.rows_affected() != 1 {
                    tx.rollback().await.map_err(db_err)?;
                    warn!(key = %write.key, observed = write.observed, "Stale update rejected");
                    return Err(write.conflict());
                }
            }
            written.insert(write.key, write.document);
        }

        tx.commit().await.map_err(db_err)?;
        debug!(written = written.len(), "Committed batch");
        Ok(written)
    }

    async fn load_by_gid(&self, gid: Gid) -> Result<Vec<StoredRecord>, StorageError> {
        let rows: Vec<Row> =
            sqlx::query_as("SELECT key, gid, version, serialized FROM entities WHERE gid = ?")
                .bind(gid.value())
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        rows.into_iter().map(record_from_row).collect()
    }

    async fn load_by_key(&self, key: &EntityKey) -> Result<Vec<StoredRecord>, StorageError> {
        let rows: Vec<Row> =
            sqlx::query_as("SELECT key, gid, version, serialized FROM entities WHERE key = ?")
                .bind(key.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        rows.into_iter().map(record_from_row).collect()
    }

    async fn load_all_keys(&self) -> Result<Vec<EntityKey>, StorageError> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM entities ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(keys.into_iter().map(EntityKey::from).collect())
    }
}
