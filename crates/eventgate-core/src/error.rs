//! Error types for the eventgate API boundary.
//!
//! Every error that can escape the public API carries a stable string code
//! (the `FFxxxxx` prefix in its display output) so that callers and tests can
//! match on the condition without parsing free-form text.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by stream lifecycle, configuration, and listener
/// operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A lifecycle operation was attempted from the wrong state
    /// (start while started, stop while stopped, start while suspended).
    #[error("FF21027: stream '{stream_id}' cannot {operation} in state '{state}'")]
    InvalidStreamState {
        stream_id: Uuid,
        operation: &'static str,
        state: String,
    },

    /// Stream configuration is missing the mandatory name.
    #[error("FF21028: event stream configuration must include a name")]
    MissingName,

    /// Stream configuration carries an unknown sink type.
    #[error("FF21029: unknown event stream type '{0}'")]
    BadStreamType(String),

    /// The sink sub-configuration matching the stream type is absent or
    /// structurally invalid.
    #[error("FF21030: missing or invalid sink configuration for event stream type '{0}'")]
    MissingSinkConfig(String),

    /// The stop phase of an update-triggered restart failed.
    #[error("FF21031: failed to stop event stream to apply updated configuration: {0}")]
    StopDuringUpdateFailed(#[source] Box<StreamError>),

    /// The start phase of an update-triggered restart failed.
    #[error("FF21032: failed to restart event stream after configuration update: {0}")]
    RestartDuringUpdateFailed(#[source] Box<StreamError>),

    /// The websocket distribution mode is not one of the enumerated values.
    #[error("FF21034: unknown distribution mode '{0}'")]
    BadDistributionMode(String),

    /// The connector rejected the listener's filters/options.
    #[error("FF21040: connector rejected listener configuration: {0}")]
    ListenerVerifyFailed(String),

    /// A persisted stream row has no id.
    #[error("FF21048: event stream persisted state is missing an id")]
    MissingStreamId,

    /// A listener update changed the connector-resolved signature.
    #[error("FF21051: listener filters would change the resolved signature from '{old}' to '{new}' (reset required)")]
    ListenerSignatureChanged { old: String, new: String },

    /// Reset was requested for a listener that does not exist.
    #[error("FF21052: cannot reset listener '{0}' as it does not exist on this stream")]
    ResetNonExistentListener(Uuid),

    /// The stream context was cancelled while an operation was in progress.
    #[error("FF00154: operation cancelled by stream shutdown")]
    ContextCancelled,

    /// An error from the connector, surfaced unchanged.
    #[error("connector error: {0}")]
    Connector(String),

    /// An error from the persistence layer, surfaced unchanged.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The websocket hub channel for this stream is closed.
    #[error("websocket channel closed for stream '{0}'")]
    WebSocketClosed(String),

    /// A websocket client negatively acknowledged a batch.
    #[error("websocket client rejected batch: {0}")]
    WebSocketNack(String),

    /// The webhook sink could not be constructed or reached.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Multiple errors aggregated from a stop operation.
    #[error("{} errors stopping stream: {}", .0.len(), .0.join("; "))]
    StopAggregate(Vec<String>),
}

impl StreamError {
    /// The stable code for this error, when it has one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            StreamError::InvalidStreamState { .. } => Some("FF21027"),
            StreamError::MissingName => Some("FF21028"),
            StreamError::BadStreamType(_) => Some("FF21029"),
            StreamError::MissingSinkConfig(_) => Some("FF21030"),
            StreamError::StopDuringUpdateFailed(_) => Some("FF21031"),
            StreamError::RestartDuringUpdateFailed(_) => Some("FF21032"),
            StreamError::BadDistributionMode(_) => Some("FF21034"),
            StreamError::ListenerVerifyFailed(_) => Some("FF21040"),
            StreamError::MissingStreamId => Some("FF21048"),
            StreamError::ListenerSignatureChanged { .. } => Some("FF21051"),
            StreamError::ResetNonExistentListener(_) => Some("FF21052"),
            StreamError::ContextCancelled => Some("FF00154"),
            _ => None,
        }
    }
}

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
