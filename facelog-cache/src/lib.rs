//! Durable local cache for the checkpoint.
//!
//! Holds two collections in a single SQLite file:
//! - the attendance log queue, appended once per capture cycle and drained
//!   oldest-first by the sync loop
//! - a snapshot of registered users, replaced wholesale on every refresh
//!
//! # Architecture
//!
//! [`LocalCache`] is the synchronous store. [`CacheHandle`] puts a dedicated
//! writer thread in front of it so async callers never block on disk: every
//! mutation is queued, applied in order, and acknowledged once committed.
//! Reads go straight to the store on the blocking pool.

mod error;
mod store;
mod writer;

pub use error::{StorageError, StorageResult};
pub use store::LocalCache;
pub use writer::{CacheHandle, DEFAULT_QUEUE_DEPTH};
