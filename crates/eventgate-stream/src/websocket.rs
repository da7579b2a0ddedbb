//! WebSocket hub boundary.
//!
//! Streams do not own websocket connections; an external hub multiplexes
//! client connections and hands out per-stream channel bundles addressed by
//! stream name. Load-balanced delivery sends a batch to one client and waits
//! for its acknowledgement; broadcast delivery fans the batch out with no
//! acknowledgement.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use eventgate_connector::EventWithContext;

/// Acknowledgement from a websocket client: `None` accepts the batch,
/// `Some(reason)` rejects it.
pub type WsAck = Option<String>;

/// Channel bundle for one stream, handed out by the hub.
#[derive(Clone)]
pub struct WebSocketStreamChannels {
    /// Load-balanced delivery: one connected client receives each batch.
    pub sender: mpsc::Sender<Vec<EventWithContext>>,
    /// Broadcast delivery: every connected client receives each batch.
    pub broadcast: mpsc::Sender<Vec<EventWithContext>>,
    /// Acknowledgements for load-balanced batches, in dispatch order.
    pub receiver: Arc<Mutex<mpsc::Receiver<WsAck>>>,
}

/// Hub that owns the websocket connections for all streams.
pub trait WebSocketChannels: Send + Sync {
    /// The channel bundle for the stream with the given name.
    fn get_channels(&self, stream_name: &str) -> WebSocketStreamChannels;
}
