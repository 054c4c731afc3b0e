//! SQLite-backed store for the attendance log and user snapshot.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use facelog_types::{CachedUser, LogEntry, LogEntryId};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_COLUMNS: &str = "id, subject_name, subject_id, event_type, status, distance, \
     failure_reason, captured_image, created_at, synced, synced_at";

const USERS_REFRESHED_KEY: &str = "users_refreshed_at";

/// Persistent store for the checkpoint's offline state.
pub struct LocalCache {
    conn: Mutex<Connection>,
}

impl LocalCache {
    /// Opens (or creates) a cache at the given path.
    ///
    /// The file runs in WAL mode with `synchronous=FULL`, so every committed
    /// write has been fsynced when the call that made it returns.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        debug!(journal_mode = %mode, path = %path.display(), "Opened local cache");

        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Opens an in-memory cache (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS attendance_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                subject_name TEXT NOT NULL,
                subject_id TEXT,
                event_type TEXT NOT NULL,
                status TEXT NOT NULL,
                distance REAL,
                failure_reason TEXT,
                captured_image BLOB,
                created_at INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0,
                synced_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_attendance_log_pending
                ON attendance_log (synced, seq);

            CREATE TABLE IF NOT EXISTS cached_users (
                position INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                role TEXT NOT NULL,
                thumbnail BLOB,
                last_refreshed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cache_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Attendance log ───────────────────────────────────────────

    /// Appends an entry to the log as unsynced.
    ///
    /// The `synced` fields of `entry` are ignored. Appending an id that is
    /// already present fails with [`StorageError::DuplicateEntry`].
    pub fn append_log(&self, entry: &LogEntry) -> StorageResult<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO attendance_log (id, subject_name, subject_id, event_type, status, \
             distance, failure_reason, captured_image, created_at, synced, synced_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL)",
            params![
                entry.id.to_string(),
                entry.subject_name,
                entry.subject_id,
                entry.event_type.as_str(),
                entry.status.as_str(),
                entry.distance,
                entry.failure_reason,
                entry.captured_image.as_deref(),
                entry.created_at.timestamp_millis(),
            ],
        );

        match result {
            Ok(_) => {
                debug!(entry_id = %entry.id, status = %entry.status, "Appended log entry");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(StorageError::DuplicateEntry(entry.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns every unsynced entry in creation order.
    pub fn unsynced_logs(&self) -> StorageResult<Vec<LogEntry>> {
        self.query_logs(
            &format!("SELECT {LOG_COLUMNS} FROM attendance_log WHERE synced = 0 ORDER BY seq ASC"),
            params![],
        )
    }

    /// Returns at most `limit` unsynced entries, oldest first.
    pub fn unsynced_logs_limited(&self, limit: usize) -> StorageResult<Vec<LogEntry>> {
        self.query_logs(
            &format!(
                "SELECT {LOG_COLUMNS} FROM attendance_log WHERE synced = 0 ORDER BY seq ASC LIMIT ?1"
            ),
            params![limit as i64],
        )
    }

    /// Returns the number of unsynced entries.
    pub fn unsynced_count(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM attendance_log WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Returns the most recent entries, newest first, synced or not.
    pub fn recent_logs(&self, limit: usize) -> StorageResult<Vec<LogEntry>> {
        self.query_logs(
            &format!("SELECT {LOG_COLUMNS} FROM attendance_log ORDER BY seq DESC LIMIT ?1"),
            params![limit as i64],
        )
    }

    /// Looks up a single entry.
    pub fn log_entry(&self, id: &LogEntryId) -> StorageResult<Option<LogEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM attendance_log WHERE id = ?1"),
                params![id.to_string()],
                LogRow::from_row,
            )
            .optional()?;
        row.map(LogRow::into_entry).transpose()
    }

    /// Marks an entry as synced.
    ///
    /// Returns `true` if the entry moved from unsynced to synced, `false` if
    /// it was already synced or is unknown. Neither case is an error.
    pub fn mark_synced(&self, id: &LogEntryId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE attendance_log SET synced = 1, synced_at = ?2 WHERE id = ?1 AND synced = 0",
            params![id.to_string(), Utc::now().timestamp_millis()],
        )?;
        if changed == 0 {
            debug!(entry_id = %id, "mark_synced was a no-op");
        }
        Ok(changed > 0)
    }

    /// Deletes synced entries whose sync is older than `retention`.
    pub fn prune_synced(&self, retention: Duration) -> StorageResult<usize> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| StorageError::InvalidData(format!("retention out of range: {e}")))?;
        self.prune_synced_before(Utc::now() - retention)
    }

    /// Deletes synced entries that were synced strictly before `cutoff`.
    /// Unsynced entries are never touched.
    pub fn prune_synced_before(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM attendance_log WHERE synced = 1 AND synced_at < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        if removed > 0 {
            info!(removed, "Pruned synced log entries");
        }
        Ok(removed)
    }

    fn query_logs(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, LogRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    // ── User snapshot ────────────────────────────────────────────

    /// Replaces the whole user snapshot in one transaction.
    ///
    /// Readers see either the previous set or the new one, never a mix. If
    /// any row fails to insert, the previous set is kept.
    pub fn replace_users(&self, users: &[CachedUser]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cached_users", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cached_users (position, id, display_name, role, thumbnail, \
                 last_refreshed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, user) in users.iter().enumerate() {
                stmt.execute(params![
                    position as i64,
                    user.id,
                    user.display_name,
                    user.role,
                    user.thumbnail.as_deref(),
                    user.last_refreshed_at.timestamp_millis(),
                ])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO cache_meta (key, value) VALUES (?1, ?2)",
            params![USERS_REFRESHED_KEY, Utc::now().timestamp_millis().to_string()],
        )?;
        tx.commit()?;
        info!(count = users.len(), "Replaced cached users");
        Ok(())
    }

    /// Returns the cached users in the order they were supplied.
    pub fn cached_users(&self) -> StorageResult<Vec<CachedUser>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, display_name, role, thumbnail, last_refreshed_at \
             FROM cached_users ORDER BY position ASC",
        )?;
        let rows = stmt.query_map([], UserRow::from_row)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?.into_user()?);
        }
        Ok(users)
    }

    /// Looks up one cached user by id.
    pub fn cached_user(&self, id: &str) -> StorageResult<Option<CachedUser>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, display_name, role, thumbnail, last_refreshed_at \
                 FROM cached_users WHERE id = ?1",
                params![id],
                UserRow::from_row,
            )
            .optional()?;
        row.map(UserRow::into_user).transpose()
    }

    /// When the snapshot was last replaced, if ever.
    pub fn users_refreshed_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                params![USERS_REFRESHED_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            None => Ok(None),
            Some(raw) => {
                let millis: i64 = raw.parse().map_err(|e| {
                    StorageError::InvalidData(format!("invalid refresh timestamp {raw:?}: {e}"))
                })?;
                millis_to_datetime(millis).map(Some)
            }
        }
    }

    /// Drops the user snapshot.
    pub fn clear_users(&self) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cached_users", [])?;
        tx.execute(
            "DELETE FROM cache_meta WHERE key = ?1",
            params![USERS_REFRESHED_KEY],
        )?;
        tx.commit()?;
        warn!("Cleared cached users");
        Ok(())
    }
}

fn millis_to_datetime(millis: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {millis}")))
}

/// Raw `attendance_log` row, decoded into a [`LogEntry`] outside the
/// rusqlite callback so conversion errors keep their own variant.
struct LogRow {
    id: String,
    subject_name: String,
    subject_id: Option<String>,
    event_type: String,
    status: String,
    distance: Option<f64>,
    failure_reason: Option<String>,
    captured_image: Option<Vec<u8>>,
    created_at: i64,
    synced: bool,
    synced_at: Option<i64>,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject_name: row.get(1)?,
            subject_id: row.get(2)?,
            event_type: row.get(3)?,
            status: row.get(4)?,
            distance: row.get(5)?,
            failure_reason: row.get(6)?,
            captured_image: row.get(7)?,
            created_at: row.get(8)?,
            synced: row.get(9)?,
            synced_at: row.get(10)?,
        })
    }

    fn into_entry(self) -> StorageResult<LogEntry> {
        let id = LogEntryId::parse(&self.id)
            .map_err(|e| StorageError::InvalidData(format!("invalid log id {:?}: {e}", self.id)))?;
        let event_type = self
            .event_type
            .parse()
            .map_err(|e| StorageError::InvalidData(format!("{e}")))?;
        let status = self
            .status
            .parse()
            .map_err(|e| StorageError::InvalidData(format!("{e}")))?;

        Ok(LogEntry {
            id,
            subject_name: self.subject_name,
            subject_id: self.subject_id,
            event_type,
            status,
            distance: self.distance,
            failure_reason: self.failure_reason,
            captured_image: self.captured_image,
            created_at: millis_to_datetime(self.created_at)?,
            synced: self.synced,
            synced_at: self.synced_at.map(millis_to_datetime).transpose()?,
        })
    }
}

struct UserRow {
    id: String,
    display_name: String,
    role: String,
    thumbnail: Option<Vec<u8>>,
    last_refreshed_at: i64,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            display_name: row.get(1)?,
            role: row.get(2)?,
            thumbnail: row.get(3)?,
            last_refreshed_at: row.get(4)?,
        })
    }

    fn into_user(self) -> StorageResult<CachedUser> {
        Ok(CachedUser {
            id: self.id,
            display_name: self.display_name,
            role: self.role,
            thumbnail: self.thumbnail,
            last_refreshed_at: millis_to_datetime(self.last_refreshed_at)?,
        })
    }
}
