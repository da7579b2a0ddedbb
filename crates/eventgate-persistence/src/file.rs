//! File-based persistence backend.
//!
//! One JSON document per row, under `<dir>/checkpoints/<stream-id>.json` and
//! `<dir>/streams/<stream-id>.json`. Writes go to a `.tmp` sibling first and
//! are renamed into place, so a crash never leaves a torn document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use eventgate_core::{StreamCheckpoint, StreamSpec};

use crate::{Persistence, PersistenceError, PersistenceResult};

/// A [`Persistence`] backend that stores each row as a JSON file.
pub struct FilePersistence {
    checkpoints_dir: PathBuf,
    streams_dir: PathBuf,
}

impl FilePersistence {
    /// Create a file persistence rooted at `directory`, creating the
    /// sub-directories if needed.
    pub fn new(directory: impl AsRef<Path>) -> PersistenceResult<Self> {
        let checkpoints_dir = directory.as_ref().join("checkpoints");
        let streams_dir = directory.as_ref().join("streams");
        std::fs::create_dir_all(&checkpoints_dir)?;
        std::fs::create_dir_all(&streams_dir)?;
        Ok(Self {
            checkpoints_dir,
            streams_dir,
        })
    }

    fn row_path(dir: &Path, id: &Uuid) -> PathBuf {
        dir.join(format!("{id}.json"))
    }

    async fn write_row(dir: &Path, id: &Uuid, data: Vec<u8>) -> PersistenceResult<()> {
        let final_path = Self::row_path(dir, id);
        let tmp_path = dir.join(format!("{id}.json.tmp"));
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        debug!(path = %final_path.display(), bytes = data.len(), "row written");
        Ok(())
    }

    async fn delete_row(dir: &Path, id: &Uuid) -> PersistenceResult<()> {
        let path = Self::row_path(dir, id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "row deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Persistence for FilePersistence {
    async fn get_checkpoint(
        &self,
        stream_id: &Uuid,
    ) -> PersistenceResult<Option<StreamCheckpoint>> {
        let path = Self::row_path(&self.checkpoints_dir, stream_id);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_checkpoint(&self, checkpoint: &StreamCheckpoint) -> PersistenceResult<()> {
        let data = serde_json::to_vec(checkpoint)?;
        Self::write_row(&self.checkpoints_dir, &checkpoint.stream_id, data).await
    }

    async fn delete_checkpoint(&self, stream_id: &Uuid) -> PersistenceResult<()> {
        Self::delete_row(&self.checkpoints_dir, stream_id).await
    }

    async fn write_stream(&self, spec: &StreamSpec) -> PersistenceResult<()> {
        let id = spec
            .id
            .ok_or_else(|| PersistenceError::Internal("stream spec has no id".to_string()))?;
        let data = serde_json::to_vec(spec)?;
        Self::write_row(&self.streams_dir, &id, data).await
    }

    async fn get_streams(&self) -> PersistenceResult<Vec<StreamSpec>> {
        let mut specs = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.streams_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".json") {
                continue;
            }
            let data = tokio::fs::read(entry.path()).await?;
            specs.push(serde_json::from_slice(&data)?);
        }
        // Time-ordered ids give a stable creation order.
        specs.sort_by_key(|s: &StreamSpec| s.id);
        Ok(specs)
    }

    async fn delete_stream(&self, stream_id: &Uuid) -> PersistenceResult<()> {
        Self::delete_row(&self.streams_dir, stream_id).await
    }
}
