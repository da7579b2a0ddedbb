//! In-memory persistence backend for tests and embedded deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use eventgate_core::{StreamCheckpoint, StreamSpec};

use crate::{Persistence, PersistenceResult};

/// A [`Persistence`] backend holding all rows in process memory.
#[derive(Default)]
pub struct MemoryPersistence {
    checkpoints: RwLock<HashMap<Uuid, StreamCheckpoint>>,
    streams: RwLock<HashMap<Uuid, StreamSpec>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn get_checkpoint(
        &self,
        stream_id: &Uuid,
    ) -> PersistenceResult<Option<StreamCheckpoint>> {
        Ok(self.checkpoints.read().unwrap().get(stream_id).cloned())
    }

    async fn write_checkpoint(&self, checkpoint: &StreamCheckpoint) -> PersistenceResult<()> {
        self.checkpoints
            .write()
            .unwrap()
            .insert(checkpoint.stream_id, checkpoint.clone());
        Ok(())
    }

    async fn delete_checkpoint(&self, stream_id: &Uuid) -> PersistenceResult<()> {
        self.checkpoints.write().unwrap().remove(stream_id);
        Ok(())
    }

    async fn write_stream(&self, spec: &StreamSpec) -> PersistenceResult<()> {
        if let Some(id) = spec.id {
            self.streams.write().unwrap().insert(id, spec.clone());
        }
        Ok(())
    }

    async fn get_streams(&self) -> PersistenceResult<Vec<StreamSpec>> {
        let mut specs: Vec<StreamSpec> = self.streams.read().unwrap().values().cloned().collect();
        specs.sort_by_key(|s| s.id);
        Ok(specs)
    }

    async fn delete_stream(&self, stream_id: &Uuid) -> PersistenceResult<()> {
        self.streams.write().unwrap().remove(stream_id);
        Ok(())
    }
}
