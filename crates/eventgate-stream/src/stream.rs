//! Stream controller: public API and lifecycle state machine.
//!
//! A stream is stopped, starting, started, stopping, or deleted. All
//! transitions and listener mutations serialize on one async mutex; the
//! started variant owns the cancellation token and the join handles of the
//! two worker loops so stop can tear them down atomically.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use eventgate_connector::{Connector, ConfirmationsManager, EventStreamStartRequest};
use eventgate_core::{
    merge_stream_config, DistributionMode, ErrorHandlingMode, ListenerSpec, Result,
    StreamCheckpoint, StreamError, StreamSpec, StreamType,
};
use eventgate_persistence::Persistence;

use crate::action::{
    webhook_action, ws_broadcast_action, ws_load_balance_action, ActionFn, RetryConfig,
};
use crate::batch_loop::BatchLoop;
use crate::event_loop::EventLoop;
use crate::listeners::ListenerRegistry;
use crate::websocket::WebSocketChannels;

const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RETRY: Duration = Duration::from_secs(30);
const MIN_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Stopped,
    Starting,
    Started,
    Stopping,
    Deleted,
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::Stopped => write!(f, "stopped"),
            StreamStatus::Starting => write!(f, "starting"),
            StreamStatus::Started => write!(f, "started"),
            StreamStatus::Stopping => write!(f, "stopping"),
            StreamStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Everything owned by a started stream, moved out atomically on stop.
pub(crate) struct StartedStreamState {
    pub cancel: CancellationToken,
    pub event_loop: JoinHandle<()>,
    pub batch_loop: JoinHandle<()>,
}

/// One configured pipeline from connector events to a delivery sink.
pub struct EventStream {
    pub(crate) id: Uuid,
    pub(crate) spec: RwLock<StreamSpec>,
    pub(crate) status: RwLock<StreamStatus>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) persistence: Arc<dyn Persistence>,
    pub(crate) ws_hub: Arc<dyn WebSocketChannels>,
    pub(crate) confirmations: Option<Arc<dyn ConfirmationsManager>>,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) lifecycle: Mutex<Option<StartedStreamState>>,
    checkpoint_interval: RwLock<Option<Duration>>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("id", &self.id)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl EventStream {
    /// Validate the spec, bind collaborators, and register the initial
    /// listener set (each verified via the connector; any failure aborts
    /// construction). The stream starts out stopped.
    pub async fn new(
        spec: &StreamSpec,
        connector: Arc<dyn Connector>,
        persistence: Arc<dyn Persistence>,
        ws_hub: Arc<dyn WebSocketChannels>,
        confirmations: Option<Arc<dyn ConfirmationsManager>>,
        initial_listeners: &[ListenerSpec],
    ) -> Result<Arc<Self>> {
        let id = spec.id.ok_or(StreamError::MissingStreamId)?;
        let (merged, _) = merge_stream_config(None, spec)?;

        let stream = Arc::new(EventStream {
            id,
            spec: RwLock::new(merged),
            status: RwLock::new(StreamStatus::Stopped),
            connector,
            persistence,
            ws_hub,
            confirmations,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Mutex::new(None),
            checkpoint_interval: RwLock::new(None),
        });

        {
            let mut slot = stream.lifecycle.lock().await;
            for listener in initial_listeners {
                let listener_id = listener.id.unwrap_or_else(Uuid::now_v7);
                stream
                    .add_or_update_listener_locked(&mut slot, listener_id, listener, false)
                    .await?;
            }
        }

        info!(stream = %stream.stream_name(), id = %id, "initialized event stream");
        Ok(stream)
    }

    pub fn stream_id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the merged spec.
    pub fn spec(&self) -> StreamSpec {
        self.spec.read().unwrap().clone()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> StreamStatus {
        *self.status.read().unwrap()
    }

    /// Override the idle checkpoint interval (defaults to the larger of the
    /// batch timeout and 30s).
    pub fn set_checkpoint_interval(&self, interval: Duration) {
        *self.checkpoint_interval.write().unwrap() = Some(interval);
    }

    pub(crate) fn stream_name(&self) -> String {
        self.spec.read().unwrap().name.clone().unwrap_or_default()
    }

    fn set_status(&self, status: StreamStatus) {
        debug!(stream = %self.stream_name(), status = %status, "stream state");
        *self.status.write().unwrap() = status;
    }

    fn state_error(&self, operation: &'static str) -> StreamError {
        StreamError::InvalidStreamState {
            stream_id: self.id,
            operation,
            state: self.status().to_string(),
        }
    }

    /// Begin pulling and delivering events. Valid only from stopped, and
    /// never valid while the spec is suspended.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.lifecycle.lock().await;
        if self.status() != StreamStatus::Stopped {
            return Err(self.state_error("start"));
        }
        if self.spec().suspended == Some(true) {
            return Err(StreamError::InvalidStreamState {
                stream_id: self.id,
                operation: "start",
                state: "suspended".to_string(),
            });
        }
        self.set_status(StreamStatus::Starting);
        match self.start_locked(&mut slot).await {
            Ok(()) => {
                self.set_status(StreamStatus::Started);
                Ok(())
            }
            Err(e) => {
                self.set_status(StreamStatus::Stopped);
                Err(e)
            }
        }
    }

    pub(crate) async fn start_locked(
        &self,
        slot: &mut Option<StartedStreamState>,
    ) -> Result<()> {
        let spec = self.spec();
        let stream_name = self.stream_name();

        let checkpoint = self
            .persistence
            .get_checkpoint(&self.id)
            .await
            .map_err(|e| StreamError::Persistence(e.to_string()))?
            .unwrap_or_else(|| StreamCheckpoint::new(self.id));

        let batch_size = spec.batch_size.unwrap_or(DEFAULT_BATCH_SIZE as u64) as usize;
        let batch_timeout = spec
            .batch_timeout
            .map(|d| d.as_duration())
            .unwrap_or(DEFAULT_BATCH_TIMEOUT);
        let retry = RetryConfig {
            error_handling: spec.error_handling.unwrap_or(ErrorHandlingMode::Block),
            blocked_retry_delay: spec
                .blocked_retry_delay
                .map(|d| d.as_duration())
                .unwrap_or(DEFAULT_RETRY),
            retry_timeout: spec
                .retry_timeout
                .map(|d| d.as_duration())
                .unwrap_or(DEFAULT_RETRY),
        };
        let checkpoint_interval = self
            .checkpoint_interval
            .read()
            .unwrap()
            .unwrap_or_else(|| batch_timeout.max(MIN_CHECKPOINT_INTERVAL));

        let cancel = CancellationToken::new();
        let action = self.init_action(&spec, &cancel)?;

        let (updates_tx, updates_rx) = mpsc::channel(batch_size);
        let (batch_tx, batch_rx) = mpsc::channel(batch_size);

        let initial_listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap()
            .values()
            .map(|l| l.start_info(Some(&checkpoint)))
            .collect();

        let event_loop = EventLoop {
            stream_name: stream_name.clone(),
            listeners: self.listeners.clone(),
            confirmations: self.confirmations.clone(),
            batch_tx,
            cancel: cancel.clone(),
        };
        let event_loop = tokio::spawn(event_loop.run(updates_rx));

        let batch_loop = BatchLoop {
            stream_id: self.id,
            stream_name: stream_name.clone(),
            batch_size,
            batch_timeout,
            checkpoint_interval,
            retry,
            connector: self.connector.clone(),
            persistence: self.persistence.clone(),
            confirmations: self.confirmations.clone(),
            listeners: self.listeners.clone(),
        };
        let batch_loop = tokio::spawn(batch_loop.run(
            batch_rx,
            cancel.clone(),
            action,
            checkpoint,
        ));

        if let Some(confirmations) = &self.confirmations {
            confirmations.start();
        }

        let request = EventStreamStartRequest {
            stream_id: self.id,
            initial_listeners,
            events: updates_tx,
            cancel: cancel.clone(),
        };
        if let Err(e) = self.connector.event_stream_start(request).await {
            error!(stream = %stream_name, error = %e, "connector rejected stream start");
            cancel.cancel();
            let _ = event_loop.await;
            let _ = batch_loop.await;
            if let Some(confirmations) = &self.confirmations {
                confirmations.stop();
            }
            return Err(StreamError::Connector(e.to_string()));
        }

        *slot = Some(StartedStreamState {
            cancel,
            event_loop,
            batch_loop,
        });
        info!(stream = %stream_name, "event stream started");
        Ok(())
    }

    /// Stop delivery. Valid only from started. Connector listener-remove
    /// failures are aggregated into the returned error; the stream always
    /// finishes in the stopped state.
    pub async fn stop(&self) -> Result<()> {
        let mut slot = self.lifecycle.lock().await;
        self.stop_locked(&mut slot).await
    }

    pub(crate) async fn stop_locked(
        &self,
        slot: &mut Option<StartedStreamState>,
    ) -> Result<()> {
        if self.status() != StreamStatus::Started {
            return Err(self.state_error("stop"));
        }
        self.set_status(StreamStatus::Stopping);

        if let Some(state) = slot.take() {
            self.teardown_started(state).await;
        }

        let ids: Vec<Uuid> = self.listeners.read().unwrap().keys().copied().collect();
        let mut errors = Vec::new();
        for listener_id in ids {
            if let Err(e) = self.connector.event_listener_remove(&listener_id).await {
                warn!(
                    stream = %self.stream_name(),
                    listener = %listener_id,
                    error = %e,
                    "failed to remove listener during stop"
                );
                errors.push(format!("listener {listener_id}: {e}"));
            }
        }

        self.set_status(StreamStatus::Stopped);
        info!(stream = %self.stream_name(), "event stream stopped");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StreamError::StopAggregate(errors))
        }
    }

    async fn teardown_started(&self, state: StartedStreamState) {
        state.cancel.cancel();
        let _ = state.event_loop.await;
        let _ = state.batch_loop.await;
        if let Some(confirmations) = &self.confirmations {
            confirmations.stop();
        }
    }

    /// Tear down and re-create the started state without removing listeners
    /// at the connector. Used by listener reset. On failure the stream is
    /// left stopped.
    pub(crate) async fn restart_locked(
        &self,
        slot: &mut Option<StartedStreamState>,
    ) -> Result<()> {
        if let Some(state) = slot.take() {
            self.teardown_started(state).await;
        }
        self.set_status(StreamStatus::Starting);
        match self.start_locked(slot).await {
            Ok(()) => {
                self.set_status(StreamStatus::Started);
                Ok(())
            }
            Err(e) => {
                self.set_status(StreamStatus::Stopped);
                Err(e)
            }
        }
    }

    /// Merge an updated spec over the current one. When the merged result
    /// differs and the stream is started, it is stopped and restarted under
    /// the lifecycle mutex; a restart failure leaves the stream stopped
    /// with the merged spec stored, so a later manual start applies it.
    pub async fn update_spec(&self, updates: &StreamSpec) -> Result<()> {
        let mut slot = self.lifecycle.lock().await;
        let current = self.spec();
        let (merged, changed) = merge_stream_config(Some(&current), updates)?;
        if !changed {
            debug!(stream = %self.stream_name(), "spec update is a no-op");
            return Ok(());
        }
        *self.spec.write().unwrap() = merged;

        if self.status() == StreamStatus::Started {
            info!(stream = %self.stream_name(), "restarting stream to apply updated spec");
            if let Err(e) = self.stop_locked(&mut slot).await {
                return Err(StreamError::StopDuringUpdateFailed(Box::new(e)));
            }
            self.set_status(StreamStatus::Starting);
            if let Err(e) = self.start_locked(&mut slot).await {
                self.set_status(StreamStatus::Stopped);
                return Err(StreamError::RestartDuringUpdateFailed(Box::new(e)));
            }
            self.set_status(StreamStatus::Started);
        }
        Ok(())
    }

    /// Stop if started, then delete the persisted checkpoint. A checkpoint
    /// delete failure leaves the stream stopped so the delete can be
    /// retried.
    pub async fn delete(&self) -> Result<()> {
        let mut slot = self.lifecycle.lock().await;
        if self.status() == StreamStatus::Started {
            self.stop_locked(&mut slot).await?;
        }
        self.persistence
            .delete_checkpoint(&self.id)
            .await
            .map_err(|e| StreamError::Persistence(e.to_string()))?;
        self.set_status(StreamStatus::Deleted);
        info!(stream = %self.stream_name(), "event stream deleted");
        Ok(())
    }

    /// Select the sink action for the merged spec. The spec was validated
    /// at merge time, so an unknown variant here is a programming error.
    fn init_action(&self, spec: &StreamSpec, cancel: &CancellationToken) -> Result<ActionFn> {
        let stream_name = spec.name_or_empty().to_string();
        match &spec.stream_type {
            Some(StreamType::Websocket) => {
                let mode = spec
                    .websocket
                    .as_ref()
                    .and_then(|ws| ws.distribution_mode.clone())
                    .unwrap_or(DistributionMode::LoadBalance);
                let channels = self.ws_hub.get_channels(&stream_name);
                match mode {
                    DistributionMode::LoadBalance => {
                        Ok(ws_load_balance_action(channels, cancel.clone(), stream_name))
                    }
                    DistributionMode::Broadcast => {
                        Ok(ws_broadcast_action(channels, cancel.clone(), stream_name))
                    }
                    DistributionMode::Other(mode) => {
                        panic!("no action for distribution mode '{mode}' on stream '{stream_name}'")
                    }
                }
            }
            Some(StreamType::Webhook) => {
                let webhook = spec
                    .webhook
                    .as_ref()
                    .unwrap_or_else(|| panic!("webhook config missing on stream '{stream_name}'"));
                let url = webhook.url.clone().unwrap_or_default();
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = webhook.request_timeout {
                    builder = builder.timeout(timeout.as_duration());
                }
                if webhook.tls_skip_host_verify == Some(true) {
                    builder = builder.danger_accept_invalid_certs(true);
                }
                let client = builder
                    .build()
                    .map_err(|e| StreamError::Webhook(e.to_string()))?;
                Ok(webhook_action(client, url, cancel.clone()))
            }
            other => panic!("no action for stream type {other:?} on stream '{stream_name}'"),
        }
    }
}
