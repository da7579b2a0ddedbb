//! Persistence backends for eventgate.
//!
//! Streams survive process restarts through two kinds of rows: the stream
//! spec itself and one checkpoint per stream holding each listener's opaque
//! cursor. The [`Persistence`] trait keeps the backend pluggable; this crate
//! ships a file-based backend and an in-memory backend for tests and
//! embedded use.

pub mod file;
pub mod memory;

pub use file::FilePersistence;
pub use memory::MemoryPersistence;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use eventgate_core::{StreamCheckpoint, StreamSpec};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persistence failure: {0}")]
    Internal(String),
}

/// Result type alias for persistence operations.
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Durable storage for stream specs and checkpoints.
///
/// Checkpoint writes must be atomic: after a crash, a reader sees either the
/// previous or the new checkpoint, never a partial one.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load the checkpoint for a stream. `None` when the stream has never
    /// checkpointed.
    async fn get_checkpoint(&self, stream_id: &Uuid)
        -> PersistenceResult<Option<StreamCheckpoint>>;

    /// Write (replace) the checkpoint for a stream.
    async fn write_checkpoint(&self, checkpoint: &StreamCheckpoint) -> PersistenceResult<()>;

    /// Delete the checkpoint for a stream. Deleting a missing checkpoint
    /// succeeds.
    async fn delete_checkpoint(&self, stream_id: &Uuid) -> PersistenceResult<()>;

    /// Write (replace) a stream spec row.
    async fn write_stream(&self, spec: &StreamSpec) -> PersistenceResult<()>;

    /// Load all persisted stream specs.
    async fn get_streams(&self) -> PersistenceResult<Vec<StreamSpec>>;

    /// Delete a stream spec row. Deleting a missing row succeeds.
    async fn delete_stream(&self, stream_id: &Uuid) -> PersistenceResult<()>;
}
