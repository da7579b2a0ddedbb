//! Batch loop: size/time batching, sink dispatch, and checkpointing.
//!
//! One loop runs per started stream. It owns the stream's checkpoint for
//! the lifetime of the started state: deltas from delivered batches are
//! merged in and persisted, and an independent ticker advances idle
//! listeners to the connector's high-water mark so progress is durable even
//! without traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use eventgate_connector::{
    Connector, ConfirmationsManager, EventWithContext, ListenerEvent, ListenerHwmRequest,
};
use eventgate_core::{ErrorHandlingMode, Result, StreamCheckpoint, StreamError};
use eventgate_persistence::Persistence;

use crate::action::{perform_actions_with_retry, ActionFn, RetryConfig};
use crate::listeners::ListenerRegistry;

pub(crate) struct BatchLoop {
    pub stream_id: Uuid,
    pub stream_name: String,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub checkpoint_interval: Duration,
    pub retry: RetryConfig,
    pub connector: Arc<dyn Connector>,
    pub persistence: Arc<dyn Persistence>,
    pub confirmations: Option<Arc<dyn ConfirmationsManager>>,
    pub listeners: ListenerRegistry,
}

struct Batch {
    number: u64,
    deadline: Instant,
    events: Vec<ListenerEvent>,
}

impl BatchLoop {
    pub async fn run(
        self,
        mut batch_rx: mpsc::Receiver<ListenerEvent>,
        cancel: CancellationToken,
        action: ActionFn,
        mut checkpoint: StreamCheckpoint,
    ) {
        debug!(stream = %self.stream_name, "batch loop started");
        let mut batch_number: u64 = 0;
        let mut batch: Option<Batch> = None;
        let mut checkpoint_ticker = tokio::time::interval_at(
            Instant::now() + self.checkpoint_interval,
            self.checkpoint_interval,
        );
        checkpoint_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let batch_deadline = batch.as_ref().map(|b| b.deadline);
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Some(b) = batch.take() {
                        self.final_flush(b, &mut checkpoint, &action).await;
                    }
                    break;
                }
                maybe = batch_rx.recv() => match maybe {
                    None => break,
                    Some(event) => {
                        let b = batch.get_or_insert_with(|| {
                            batch_number += 1;
                            Batch {
                                number: batch_number,
                                deadline: Instant::now() + self.batch_timeout,
                                events: Vec::with_capacity(self.batch_size),
                            }
                        });
                        b.events.push(event);
                        if b.events.len() >= self.batch_size {
                            let full = batch.take().unwrap();
                            if self.flush(full, &mut checkpoint, &action, &cancel).await.is_err() {
                                break;
                            }
                        }
                    }
                },
                _ = tokio::time::sleep_until(
                    batch_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600)),
                ), if batch_deadline.is_some() => {
                    let timed_out = batch.take().unwrap();
                    if self.flush(timed_out, &mut checkpoint, &action, &cancel).await.is_err() {
                        break;
                    }
                }
                _ = checkpoint_ticker.tick(), if batch.is_none() => {
                    self.hwm_checkpoint(&mut checkpoint).await;
                }
            }
        }
        info!(stream = %self.stream_name, "batch loop exited");
    }

    /// Dispatch a batch and persist the resulting checkpoint delta.
    ///
    /// Returns an error only when the stream context was cancelled.
    async fn flush(
        &self,
        batch: Batch,
        checkpoint: &mut StreamCheckpoint,
        action: &ActionFn,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (events, delta) = self.prepare_dispatch(batch.events);
        debug!(
            stream = %self.stream_name,
            batch = batch.number,
            events = events.len(),
            "dispatching batch"
        );
        perform_actions_with_retry(
            cancel,
            &self.retry,
            action,
            &self.stream_name,
            batch.number,
            events,
        )
        .await?;

        checkpoint.listeners.extend(delta);
        checkpoint.time = Some(Utc::now());
        self.write_checkpoint_with_retry(checkpoint, cancel).await
    }

    /// One dispatch attempt and one checkpoint write for a batch pending at
    /// shutdown. Failures are logged and dropped.
    async fn final_flush(
        &self,
        batch: Batch,
        checkpoint: &mut StreamCheckpoint,
        action: &ActionFn,
    ) {
        let (events, delta) = self.prepare_dispatch(batch.events);
        if events.is_empty() {
            return;
        }
        match action(batch.number, 1, events).await {
            Ok(()) => {
                checkpoint.listeners.extend(delta);
                checkpoint.time = Some(Utc::now());
                if let Err(e) = self.persistence.write_checkpoint(checkpoint).await {
                    warn!(
                        stream = %self.stream_name,
                        error = %e,
                        "failed to write final checkpoint during shutdown"
                    );
                }
            }
            Err(e) => {
                warn!(
                    stream = %self.stream_name,
                    batch = batch.number,
                    error = %e,
                    "dropping undelivered batch at shutdown"
                );
            }
        }
    }

    /// Split buffered listener events into the sink payload and the
    /// checkpoint delta (last cursor per listener wins, preserving order).
    fn prepare_dispatch(
        &self,
        buffered: Vec<ListenerEvent>,
    ) -> (Vec<EventWithContext>, HashMap<Uuid, Value>) {
        let mut events = Vec::with_capacity(buffered.len());
        let mut delta = HashMap::new();
        for ev in buffered {
            let Some(event) = ev.event else { continue };
            if let Some(cursor) = ev.checkpoint {
                delta.insert(event.id.listener_id, cursor);
            }
            events.push(EventWithContext {
                stream_id: self.stream_id,
                event,
            });
        }
        (events, delta)
    }

    /// Persist the checkpoint, honouring the stream's error policy: block
    /// mode retries until the write lands or the stream stops; skip mode
    /// logs and treats the batch as delivered.
    async fn write_checkpoint_with_retry(
        &self,
        checkpoint: &StreamCheckpoint,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            match self.persistence.write_checkpoint(checkpoint).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        stream = %self.stream_name,
                        error = %e,
                        "failed to write checkpoint"
                    );
                    if self.retry.error_handling == ErrorHandlingMode::Skip {
                        return Ok(());
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(StreamError::ContextCancelled),
                        _ = tokio::time::sleep(self.retry.blocked_retry_delay) => {}
                    }
                }
            }
        }
    }

    /// Idle checkpointing: advance every quiescent listener to the
    /// connector's high-water mark and persist.
    async fn hwm_checkpoint(&self, checkpoint: &mut StreamCheckpoint) {
        let ids: Vec<Uuid> = self.listeners.read().unwrap().keys().copied().collect();
        for listener_id in ids {
            let in_flight = self
                .confirmations
                .as_ref()
                .map(|c| c.check_in_flight(&listener_id))
                .unwrap_or(false);
            if in_flight {
                debug!(
                    stream = %self.stream_name,
                    listener = %listener_id,
                    "skipping idle checkpoint, confirmations in flight"
                );
                continue;
            }
            match self
                .connector
                .event_listener_hwm(ListenerHwmRequest {
                    stream_id: self.stream_id,
                    listener_id,
                })
                .await
            {
                Ok(response) => {
                    if let Some(cursor) = response.checkpoint {
                        checkpoint.listeners.insert(listener_id, cursor);
                    }
                }
                Err(e) => {
                    warn!(
                        stream = %self.stream_name,
                        listener = %listener_id,
                        error = %e,
                        "failed to fetch listener high-water mark"
                    );
                }
            }
        }
        checkpoint.time = Some(Utc::now());
        if let Err(e) = self.persistence.write_checkpoint(checkpoint).await {
            warn!(
                stream = %self.stream_name,
                error = %e,
                "failed to write idle checkpoint"
            );
        }
    }
}
