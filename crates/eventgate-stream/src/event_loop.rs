//! Event loop: pulls raw listener events from the connector channel and
//! routes them toward the batch loop.
//!
//! One loop runs per started stream. Events for unknown listeners are
//! discarded; reorganisation retractions are forwarded to the confirmations
//! manager; everything else is either submitted for confirmation (the
//! confirmed callback enqueues onto the batch channel) or pushed straight
//! onto the batch channel when no manager is configured.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use eventgate_connector::{
    ConfirmationNotification, ConfirmationsManager, EventNotification, ListenerEvent,
};

use crate::listeners::ListenerRegistry;

pub(crate) struct EventLoop {
    pub stream_name: String,
    pub listeners: ListenerRegistry,
    pub confirmations: Option<Arc<dyn ConfirmationsManager>>,
    pub batch_tx: mpsc::Sender<ListenerEvent>,
    pub cancel: CancellationToken,
}

impl EventLoop {
    pub async fn run(self, mut updates: mpsc::Receiver<ListenerEvent>) {
        debug!(stream = %self.stream_name, "event loop started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                maybe = updates.recv() => match maybe {
                    None => break,
                    Some(event) => self.process_new_event(event).await,
                },
            }
        }
        info!(stream = %self.stream_name, "event loop exited");
    }

    pub(crate) async fn process_new_event(&self, event: ListenerEvent) {
        let Some(listener_id) = event.listener_id() else {
            debug!(stream = %self.stream_name, "discarding malformed event");
            return;
        };
        if !self.listeners.read().unwrap().contains_key(&listener_id) {
            warn!(
                stream = %self.stream_name,
                listener = %listener_id,
                "discarding event for unknown listener"
            );
            return;
        }

        if event.removed {
            // Reorg retraction: only meaningful to a confirmations manager.
            if let Some(confirmations) = &self.confirmations {
                if let Err(e) = confirmations
                    .notify(ConfirmationNotification::Retracted(event))
                    .await
                {
                    error!(
                        stream = %self.stream_name,
                        listener = %listener_id,
                        error = %e,
                        "failed to notify confirmation manager of removed event"
                    );
                }
            }
            return;
        }

        match &self.confirmations {
            Some(confirmations) => {
                let batch_tx = self.batch_tx.clone();
                let confirmed_event = event.clone();
                let notification = ConfirmationNotification::Event(EventNotification {
                    event,
                    on_confirmed: Box::new(move |_blocks| {
                        Box::pin(async move {
                            // Channel closure means the stream already stopped.
                            let _ = batch_tx.send(confirmed_event).await;
                        })
                    }),
                });
                if let Err(e) = confirmations.notify(notification).await {
                    error!(
                        stream = %self.stream_name,
                        listener = %listener_id,
                        error = %e,
                        "failed to submit event for confirmation, stopping stream"
                    );
                    self.cancel.cancel();
                }
            }
            None => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    sent = self.batch_tx.send(event) => {
                        if sent.is_err() {
                            debug!(stream = %self.stream_name, "batch channel closed");
                        }
                    }
                }
            }
        }
    }
}
