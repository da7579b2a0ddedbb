//! Wire types exchanged between the dispatcher core and a connector.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Position of an event within the chain, scoped to the listener that
/// matched it. Orders events deterministically within one listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    pub listener_id: Uuid,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

/// A single decoded chain event produced by the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(flatten)]
    pub id: EventId,
    /// Decoded event payload.
    pub data: Value,
    /// Connector-specific context (raw block/tx references and the like).
    pub info: Value,
}

/// An event update pushed by the connector onto the stream's event channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerEvent {
    /// True when a chain reorganisation retracted this event.
    #[serde(default)]
    pub removed: bool,
    /// Cursor to persist once this event has been delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
}

impl ListenerEvent {
    /// The listener this update belongs to, when the event is well formed.
    pub fn listener_id(&self) -> Option<Uuid> {
        self.event.as_ref().map(|e| e.id.listener_id)
    }
}

/// An event enriched with its delivery context, as handed to sinks.
///
/// The listener id already travels inside the flattened event id, so the
/// serialized form carries `streamId` plus the connector's event fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWithContext {
    pub stream_id: Uuid,
    #[serde(flatten)]
    pub event: Event,
}

impl EventWithContext {
    pub fn listener_id(&self) -> Uuid {
        self.event.id.listener_id
    }
}

/// Request to verify a listener's filters and options.
#[derive(Debug, Clone)]
pub struct ListenerVerifyOptionsRequest {
    pub filters: Vec<Value>,
    pub options: Option<Value>,
    pub from_block: Option<String>,
}

/// Successful verification result.
#[derive(Debug, Clone)]
pub struct ListenerVerifyOptionsResponse {
    /// Fingerprint of the filter set; defines the listener's semantic
    /// identity.
    pub resolved_signature: String,
    /// Options with connector defaults applied.
    pub resolved_options: Value,
}

/// Per-listener start information compiled by the dispatcher at stream
/// start (and for post-start adds).
#[derive(Debug, Clone)]
pub struct ListenerStartInfo {
    pub listener_id: Uuid,
    pub filters: Vec<Value>,
    pub options: Option<Value>,
    /// Last persisted cursor, if any.
    pub checkpoint: Option<Value>,
}

/// Request to begin event delivery for a stream.
pub struct EventStreamStartRequest {
    pub stream_id: Uuid,
    pub initial_listeners: Vec<ListenerStartInfo>,
    /// Channel the connector pushes [`ListenerEvent`]s onto. Owned by the
    /// stream's event loop on the receiving side.
    pub events: mpsc::Sender<ListenerEvent>,
    /// Fires when the stream is stopped; the connector must cease delivery.
    pub cancel: CancellationToken,
}

/// Request to add a listener to a started stream.
pub type ListenerAddRequest = ListenerStartInfo;

/// Request for a listener's current high-water mark.
#[derive(Debug, Clone)]
pub struct ListenerHwmRequest {
    pub stream_id: Uuid,
    pub listener_id: Uuid,
}

/// High-water mark response: the connector's latest observed position,
/// usable as a checkpoint cursor.
#[derive(Debug, Clone)]
pub struct ListenerHwmResponse {
    pub checkpoint: Option<Value>,
}
