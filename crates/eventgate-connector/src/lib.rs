//! Connector boundary for the eventgate event-stream dispatcher.
//!
//! A connector adapts one upstream chain to the dispatcher: it verifies
//! listener filter sets, starts/stops event delivery for a stream, and
//! reports per-listener high-water marks. The dispatcher core treats
//! filters, options, and checkpoints as opaque JSON owned by the connector.

pub mod confirmations;
pub mod error;
pub mod types;

pub use confirmations::{
    BlockInfo, ConfirmationNotification, ConfirmationsManager, ConfirmedCallback,
    EventNotification,
};
pub use error::{ConnectorError, ConnectorResult};
pub use types::{
    Event, EventId, EventStreamStartRequest, EventWithContext, ListenerAddRequest, ListenerEvent,
    ListenerHwmRequest, ListenerHwmResponse, ListenerStartInfo, ListenerVerifyOptionsRequest,
    ListenerVerifyOptionsResponse,
};

use async_trait::async_trait;
use uuid::Uuid;

/// Trait that every chain connector must implement.
///
/// All methods are invoked by the dispatcher core; the connector pushes
/// [`ListenerEvent`]s onto the channel supplied in
/// [`EventStreamStartRequest`] until the stream's cancellation token fires.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Validate listener filters/options and resolve the listener signature.
    async fn event_listener_verify_options(
        &self,
        request: ListenerVerifyOptionsRequest,
    ) -> ConnectorResult<ListenerVerifyOptionsResponse>;

    /// Begin event delivery for a stream and its initial listener set.
    async fn event_stream_start(&self, request: EventStreamStartRequest) -> ConnectorResult<()>;

    /// Add a listener to an already-started stream.
    async fn event_listener_add(&self, request: ListenerAddRequest) -> ConnectorResult<()>;

    /// Remove a listener from a started stream. Removing an unknown
    /// listener must succeed.
    async fn event_listener_remove(&self, listener_id: &Uuid) -> ConnectorResult<()>;

    /// Report the connector's current high-water mark for a listener.
    async fn event_listener_hwm(
        &self,
        request: ListenerHwmRequest,
    ) -> ConnectorResult<ListenerHwmResponse>;
}
