//! Sink actions and the batch retry policy.
//!
//! An action delivers one batch to the stream's sink. The three variants
//! (websocket load-balance, websocket broadcast, webhook) are selected at
//! stream start and captured as an [`ActionFn`]; the retry wrapper applies
//! the stream's error-handling policy around whichever action is configured.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use eventgate_connector::EventWithContext;
use eventgate_core::{ErrorHandlingMode, Result, StreamError};

use crate::websocket::WebSocketStreamChannels;

/// A sink dispatch function: `(batch_number, attempt, events)`.
pub(crate) type ActionFn = Arc<
    dyn Fn(u64, u64, Vec<EventWithContext>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Retry policy applied around every batch dispatch.
#[derive(Debug, Clone)]
pub(crate) struct RetryConfig {
    pub error_handling: ErrorHandlingMode,
    pub blocked_retry_delay: Duration,
    pub retry_timeout: Duration,
}

/// Dispatch a batch with the configured error handling.
///
/// Block mode retries until the action succeeds or the stream context is
/// cancelled. Skip mode retries until `retry_timeout` has elapsed since the
/// first attempt, then drops the batch and reports success (zero timeout
/// means a single attempt). An empty batch is a no-op success.
pub(crate) async fn perform_actions_with_retry(
    cancel: &CancellationToken,
    config: &RetryConfig,
    action: &ActionFn,
    stream_name: &str,
    batch_number: u64,
    events: Vec<EventWithContext>,
) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let started_at = Instant::now();
    let mut attempt: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(StreamError::ContextCancelled);
        }
        attempt += 1;
        match action(batch_number, attempt, events.clone()).await {
            Ok(()) => {
                debug!(
                    stream = %stream_name,
                    batch = batch_number,
                    attempt,
                    events = events.len(),
                    "batch delivered"
                );
                return Ok(());
            }
            Err(StreamError::ContextCancelled) => return Err(StreamError::ContextCancelled),
            Err(e) => {
                error!(
                    stream = %stream_name,
                    batch = batch_number,
                    attempt,
                    error = %e,
                    "batch dispatch failed"
                );
                if config.error_handling == ErrorHandlingMode::Skip
                    && started_at.elapsed() >= config.retry_timeout
                {
                    warn!(
                        stream = %stream_name,
                        batch = batch_number,
                        events = events.len(),
                        "skipping batch after retry timeout"
                    );
                    return Ok(());
                }
                tokio::select! {
                    _ = cancel.cancelled() => return Err(StreamError::ContextCancelled),
                    _ = sleep(config.blocked_retry_delay) => {}
                }
            }
        }
    }
}

/// Load-balanced websocket delivery: send the batch to one client, then
/// block for its acknowledgement.
pub(crate) fn ws_load_balance_action(
    channels: WebSocketStreamChannels,
    cancel: CancellationToken,
    stream_name: String,
) -> ActionFn {
    Arc::new(move |_batch_number, _attempt, events| {
        let sender = channels.sender.clone();
        let receiver = channels.receiver.clone();
        let cancel = cancel.clone();
        let stream_name = stream_name.clone();
        Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => return Err(StreamError::ContextCancelled),
                sent = sender.send(events) => {
                    sent.map_err(|_| StreamError::WebSocketClosed(stream_name.clone()))?;
                }
            }
            let mut rx = receiver.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => Err(StreamError::ContextCancelled),
                ack = rx.recv() => match ack {
                    Some(None) => Ok(()),
                    Some(Some(reason)) => Err(StreamError::WebSocketNack(reason)),
                    None => Err(StreamError::WebSocketClosed(stream_name)),
                },
            }
        })
    })
}

/// Broadcast websocket delivery: enqueue for all clients, no
/// acknowledgement.
pub(crate) fn ws_broadcast_action(
    channels: WebSocketStreamChannels,
    cancel: CancellationToken,
    stream_name: String,
) -> ActionFn {
    Arc::new(move |_batch_number, _attempt, events| {
        let broadcast = channels.broadcast.clone();
        let cancel = cancel.clone();
        let stream_name = stream_name.clone();
        Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(StreamError::ContextCancelled),
                sent = broadcast.send(events) => {
                    sent.map_err(|_| StreamError::WebSocketClosed(stream_name))
                }
            }
        })
    })
}

/// Webhook delivery: POST the batch as a JSON array, success iff 2xx within
/// the configured request timeout.
pub(crate) fn webhook_action(
    client: reqwest::Client,
    url: String,
    cancel: CancellationToken,
) -> ActionFn {
    Arc::new(move |_batch_number, _attempt, events| {
        let client = client.clone();
        let url = url.clone();
        let cancel = cancel.clone();
        Box::pin(async move {
            let request = client.post(&url).json(&events).send();
            tokio::select! {
                _ = cancel.cancelled() => Err(StreamError::ContextCancelled),
                result = request => match result {
                    Ok(response) if response.status().is_success() => Ok(()),
                    Ok(response) => Err(StreamError::Webhook(format!(
                        "{} returned status {}",
                        url,
                        response.status()
                    ))),
                    Err(e) => Err(StreamError::Webhook(e.to_string())),
                },
            }
        })
    })
}
