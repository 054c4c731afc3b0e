//! Orchestration for the FaceLog checkpoint.
//!
//! [`Orchestrator`] wires the camera, recognition client, local cache and
//! connectivity manager together. It is the only place that decides when to
//! retry: a capture cycle is attempted once and always leaves exactly one
//! durable [`LogEntry`](facelog_types::LogEntry) behind, while the sync loop
//! started by [`Orchestrator::spawn_sync_loop`] keeps draining the unsynced
//! queue, backing off while the service keeps failing.

mod backoff;
mod config;
mod error;
mod events;
mod orchestrator;
mod sync_loop;

pub use backoff::SyncBackoff;
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use events::{CycleOutcome, CycleRecord, DrainReport, PipelineEvent};
pub use orchestrator::{Orchestrator, PipelineStatus};
pub use sync_loop::OrchestratorHandle;
