//! Listener registry and mutation protocol.
//!
//! Listeners are the unit of checkpointing: each one binds a filter set to a
//! connector-resolved signature that is immutable for the listener's
//! lifetime. All mutations run under the stream's lifecycle mutex so they
//! serialize with start/stop/update.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use eventgate_connector::{ListenerStartInfo, ListenerVerifyOptionsRequest};
use eventgate_core::{ListenerSpec, Result, StreamCheckpoint, StreamError};

use crate::stream::{EventStream, StartedStreamState, StreamStatus};

/// Runtime state of one registered listener.
#[derive(Debug, Clone)]
pub struct ListenerRuntime {
    /// The listener spec as configured, with the resolved signature and
    /// defaulted name applied.
    pub spec: ListenerSpec,
    /// Options with connector defaults applied; used for connector
    /// start/add requests.
    pub resolved_options: Value,
}

pub(crate) type ListenerRegistry = Arc<RwLock<HashMap<Uuid, ListenerRuntime>>>;

impl ListenerRuntime {
    /// Start/add request payload for this listener.
    pub(crate) fn start_info(&self, checkpoint: Option<&StreamCheckpoint>) -> ListenerStartInfo {
        let listener_id = self.spec.id.unwrap_or_default();
        ListenerStartInfo {
            listener_id,
            filters: self.spec.filters.clone(),
            options: Some(self.resolved_options.clone()),
            checkpoint: checkpoint.and_then(|cp| cp.listeners.get(&listener_id).cloned()),
        }
    }
}

impl EventStream {
    /// Add a new listener, or update an existing one.
    ///
    /// With `reset = true` the listener's checkpoint entry is cleared and,
    /// on a started stream, event delivery restarts from the listener's
    /// configured `fromBlock`. An update whose filters change the
    /// connector-resolved signature is rejected.
    pub async fn add_or_update_listener(
        &self,
        listener_id: Uuid,
        updates: &ListenerSpec,
        reset: bool,
    ) -> Result<ListenerSpec> {
        let mut slot = self.lifecycle.lock().await;
        self.add_or_update_listener_locked(&mut slot, listener_id, updates, reset)
            .await
    }

    pub(crate) async fn add_or_update_listener_locked(
        &self,
        slot: &mut Option<StartedStreamState>,
        listener_id: Uuid,
        updates: &ListenerSpec,
        reset: bool,
    ) -> Result<ListenerSpec> {
        let stream_id = self.stream_id();
        let mut incoming = updates.clone();
        incoming.migrate_deprecated_fields();

        let existing = self.listeners.read().unwrap().get(&listener_id).cloned();

        // Fields absent from the update are inherited from the stored spec.
        let mut merged = ListenerSpec {
            id: Some(listener_id),
            stream_id: Some(stream_id),
            ..Default::default()
        };
        if let Some(ex) = &existing {
            merged.filters = ex.spec.filters.clone();
            merged.options = ex.spec.options.clone();
            merged.from_block = ex.spec.from_block.clone();
            merged.name = ex.spec.name.clone();
            merged.created = ex.spec.created;
        }
        if !incoming.filters.is_empty() {
            merged.filters = incoming.filters;
        }
        if incoming.options.is_some() {
            merged.options = incoming.options;
        }
        if incoming.from_block.is_some() {
            merged.from_block = incoming.from_block;
        }
        if incoming.name.is_some() {
            merged.name = incoming.name;
        }

        if let Some(ex) = &existing {
            let unchanged = merged.filters == ex.spec.filters
                && merged.options == ex.spec.options
                && merged.from_block == ex.spec.from_block;
            if unchanged && !reset {
                debug!(
                    stream = %self.stream_name(),
                    listener = %listener_id,
                    "listener unchanged"
                );
                return Ok(ex.spec.clone());
            }
        }

        let verified = self
            .connector
            .event_listener_verify_options(ListenerVerifyOptionsRequest {
                filters: merged.filters.clone(),
                options: merged.options.clone(),
                from_block: merged.from_block.clone(),
            })
            .await
            .map_err(|e| StreamError::ListenerVerifyFailed(e.to_string()))?;

        if let Some(ex) = &existing {
            let old = ex.spec.signature.clone().unwrap_or_default();
            if old != verified.resolved_signature {
                return Err(StreamError::ListenerSignatureChanged {
                    old,
                    new: verified.resolved_signature,
                });
            }
        }

        if reset {
            if existing.is_none() {
                return Err(StreamError::ResetNonExistentListener(listener_id));
            }
            // Clear just this listener's cursor; a write failure leaves the
            // registry untouched.
            let mut checkpoint = self
                .persistence
                .get_checkpoint(&stream_id)
                .await
                .map_err(|e| StreamError::Persistence(e.to_string()))?
                .unwrap_or_else(|| StreamCheckpoint::new(stream_id));
            checkpoint.listeners.remove(&listener_id);
            checkpoint.time = Some(Utc::now());
            self.persistence
                .write_checkpoint(&checkpoint)
                .await
                .map_err(|e| StreamError::Persistence(e.to_string()))?;
        }

        merged.signature = Some(verified.resolved_signature.clone());
        if merged.name.as_deref().unwrap_or("").is_empty() {
            merged.name = Some(verified.resolved_signature);
        }
        let now = Utc::now();
        merged.created.get_or_insert(now);
        merged.updated = Some(now);

        let runtime = ListenerRuntime {
            spec: merged.clone(),
            resolved_options: verified.resolved_options,
        };

        let started = self.status() == StreamStatus::Started;
        let is_new = existing.is_none();

        // The registry must know the listener before the connector can emit
        // its events, so the event loop does not discard the first ones.
        self.listeners
            .write()
            .unwrap()
            .insert(listener_id, runtime.clone());

        if started && is_new && !reset {
            let checkpoint = match self.persistence.get_checkpoint(&stream_id).await {
                Ok(cp) => cp,
                Err(e) => {
                    self.listeners.write().unwrap().remove(&listener_id);
                    return Err(StreamError::Persistence(e.to_string()));
                }
            };
            if let Err(e) = self
                .connector
                .event_listener_add(runtime.start_info(checkpoint.as_ref()))
                .await
            {
                self.listeners.write().unwrap().remove(&listener_id);
                return Err(StreamError::Connector(e.to_string()));
            }
        }

        info!(
            stream = %self.stream_name(),
            listener = %listener_id,
            new = is_new,
            reset,
            "listener registered"
        );

        if reset && started {
            self.connector
                .event_listener_remove(&listener_id)
                .await
                .map_err(|e| StreamError::Connector(e.to_string()))?;
            self.restart_locked(slot).await?;
        }

        Ok(merged)
    }

    /// Snapshot of one registered listener's spec.
    pub fn listener_spec(&self, listener_id: &Uuid) -> Option<ListenerSpec> {
        self.listeners
            .read()
            .unwrap()
            .get(listener_id)
            .map(|l| l.spec.clone())
    }

    /// Snapshot of all registered listener specs.
    pub fn listener_specs(&self) -> Vec<ListenerSpec> {
        let mut specs: Vec<ListenerSpec> = self
            .listeners
            .read()
            .unwrap()
            .values()
            .map(|l| l.spec.clone())
            .collect();
        specs.sort_by_key(|s| s.id);
        specs
    }

    /// Remove a listener. Removing an unknown listener is a no-op.
    pub async fn remove_listener(&self, listener_id: Uuid) -> Result<()> {
        let _slot = self.lifecycle.lock().await;

        let known = self.listeners.read().unwrap().contains_key(&listener_id);
        if !known {
            debug!(
                stream = %self.stream_name(),
                listener = %listener_id,
                "remove of unknown listener ignored"
            );
            return Ok(());
        }
        if self.status() == StreamStatus::Started {
            self.connector
                .event_listener_remove(&listener_id)
                .await
                .map_err(|e| StreamError::Connector(e.to_string()))?;
        }
        self.listeners.write().unwrap().remove(&listener_id);
        info!(
            stream = %self.stream_name(),
            listener = %listener_id,
            "listener removed"
        );
        Ok(())
    }
}
