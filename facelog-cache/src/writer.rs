//! Dedicated writer thread in front of [`LocalCache`].

use crate::error::{StorageError, StorageResult};
use crate::store::LocalCache;
use chrono::{DateTime, Utc};
use facelog_types::{CachedUser, LogEntry, LogEntryId};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Default number of mutations that may wait for the writer.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

type Reply<T> = oneshot::Sender<StorageResult<T>>;

enum WriteCommand {
    AppendLog(Box<LogEntry>, Reply<()>),
    MarkSynced(LogEntryId, Reply<bool>),
    PruneSynced(Duration, Reply<usize>),
    ReplaceUsers(Vec<CachedUser>, Reply<()>),
    ClearUsers(Reply<()>),
}

impl WriteCommand {
    fn apply(self, store: &LocalCache) {
        // A dropped receiver means the caller gave up waiting; the write
        // itself has still been committed.
        match self {
            Self::AppendLog(entry, reply) => {
                let _ = reply.send(store.append_log(&entry));
            }
            Self::MarkSynced(id, reply) => {
                let _ = reply.send(store.mark_synced(&id));
            }
            Self::PruneSynced(retention, reply) => {
                let _ = reply.send(store.prune_synced(retention));
            }
            Self::ReplaceUsers(users, reply) => {
                let _ = reply.send(store.replace_users(&users));
            }
            Self::ClearUsers(reply) => {
                let _ = reply.send(store.clear_users());
            }
        }
    }
}

/// Async, cloneable access to a [`LocalCache`].
///
/// Mutations are serialized through one writer thread and resolve once the
/// change is committed. Reads run on the blocking pool and see every write
/// that has been acknowledged.
#[derive(Clone)]
pub struct CacheHandle {
    store: Arc<LocalCache>,
    commands: mpsc::Sender<WriteCommand>,
}

impl CacheHandle {
    /// Starts the writer thread with the default queue depth.
    pub fn spawn(store: LocalCache) -> StorageResult<Self> {
        Self::spawn_with_capacity(store, DEFAULT_QUEUE_DEPTH)
    }

    /// Starts the writer thread.
    ///
    /// The thread exits once every handle has been dropped and the queue
    /// is empty.
    pub fn spawn_with_capacity(store: LocalCache, capacity: usize) -> StorageResult<Self> {
        let store = Arc::new(store);
        let (commands, mut rx) = mpsc::channel::<WriteCommand>(capacity.max(1));

        let writer_store = Arc::clone(&store);
        thread::Builder::new()
            .name("facelog-cache-writer".into())
            .spawn(move || {
                debug!("Cache writer started");
                while let Some(command) = rx.blocking_recv() {
                    command.apply(&writer_store);
                }
                info!("Cache writer stopped");
            })?;

        Ok(Self { store, commands })
    }

    /// The underlying store, for synchronous callers.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalCache> {
        &self.store
    }

    async fn submit<T>(&self, make: impl FnOnce(Reply<T>) -> WriteCommand) -> StorageResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| StorageError::WriterClosed)?;
        rx.await.map_err(|_| {
            error!("Cache writer dropped a reply");
            StorageError::WriterClosed
        })?
    }

    async fn read<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&LocalCache) -> StorageResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Appends an entry. Resolves once the entry is durable.
    pub async fn append_log(&self, entry: LogEntry) -> StorageResult<()> {
        self.submit(|reply| WriteCommand::AppendLog(Box::new(entry), reply))
            .await
    }

    /// Marks an entry synced. See [`LocalCache::mark_synced`].
    pub async fn mark_synced(&self, id: LogEntryId) -> StorageResult<bool> {
        self.submit(|reply| WriteCommand::MarkSynced(id, reply)).await
    }

    /// Deletes synced entries older than `retention`.
    pub async fn prune_synced(&self, retention: Duration) -> StorageResult<usize> {
        self.submit(|reply| WriteCommand::PruneSynced(retention, reply))
            .await
    }

    /// Atomically replaces the user snapshot.
    pub async fn replace_users(&self, users: Vec<CachedUser>) -> StorageResult<()> {
        self.submit(|reply| WriteCommand::ReplaceUsers(users, reply))
            .await
    }

    pub async fn clear_users(&self) -> StorageResult<()> {
        self.submit(WriteCommand::ClearUsers).await
    }

    pub async fn unsynced_logs(&self) -> StorageResult<Vec<LogEntry>> {
        self.read(LocalCache::unsynced_logs).await
    }

    pub async fn unsynced_logs_limited(&self, limit: usize) -> StorageResult<Vec<LogEntry>> {
        self.read(move |store| store.unsynced_logs_limited(limit))
            .await
    }

    pub async fn unsynced_count(&self) -> StorageResult<usize> {
        self.read(LocalCache::unsynced_count).await
    }

    pub async fn recent_logs(&self, limit: usize) -> StorageResult<Vec<LogEntry>> {
        self.read(move |store| store.recent_logs(limit)).await
    }

    pub async fn log_entry(&self, id: LogEntryId) -> StorageResult<Option<LogEntry>> {
        self.read(move |store| store.log_entry(&id)).await
    }

    pub async fn cached_users(&self) -> StorageResult<Vec<CachedUser>> {
        self.read(LocalCache::cached_users).await
    }

    pub async fn cached_user(&self, id: impl Into<String>) -> StorageResult<Option<CachedUser>> {
        let id = id.into();
        self.read(move |store| store.cached_user(&id)).await
    }

    pub async fn users_refreshed_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        self.read(LocalCache::users_refreshed_at).await
    }
}
