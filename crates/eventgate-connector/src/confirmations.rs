//! Confirmations-manager boundary.
//!
//! An optional intermediary that holds events back until enough blocks have
//! been mined on top of them, and that propagates chain-reorganisation
//! retractions. When no manager is configured, streams deliver events as
//! soon as the connector produces them.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ConnectorResult;
use crate::types::ListenerEvent;

/// A block observed while confirming an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_number: u64,
    pub block_hash: String,
    pub parent_hash: String,
}

/// Invoked by the manager once an event has been declared durable.
pub type ConfirmedCallback =
    Box<dyn FnOnce(Vec<BlockInfo>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// An event awaiting confirmation, with its completion callback.
pub struct EventNotification {
    pub event: ListenerEvent,
    pub on_confirmed: ConfirmedCallback,
}

/// Notification submitted to the confirmations manager.
pub enum ConfirmationNotification {
    /// Track a new event; `on_confirmed` fires when it becomes durable.
    Event(EventNotification),
    /// A previously-notified event was retracted by a reorganisation.
    Retracted(ListenerEvent),
}

/// Lifecycle and notification interface of a confirmations manager.
#[async_trait]
pub trait ConfirmationsManager: Send + Sync {
    fn start(&self);

    fn stop(&self);

    /// Submit an event or retraction for tracking.
    async fn notify(&self, notification: ConfirmationNotification) -> ConnectorResult<()>;

    /// Whether any event for this listener is still awaiting confirmation.
    fn check_in_flight(&self, listener_id: &Uuid) -> bool;
}
