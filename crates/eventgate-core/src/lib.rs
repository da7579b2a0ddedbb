//! Core API types for the eventgate event-stream dispatcher.
//!
//! Defines the persisted data model (stream specs, listener specs,
//! checkpoints), the duration wire format used throughout the REST/JSON
//! surface, the configuration merge/validate rules, and the stable error
//! codes surfaced at the API boundary.

pub mod duration;
pub mod error;
pub mod merge;
pub mod types;

pub use duration::ApiDuration;
pub use error::{Result, StreamError};
pub use merge::merge_stream_config;
pub use types::{
    DistributionMode, ErrorHandlingMode, ListenerSpec, StreamCheckpoint, StreamSpec, StreamType,
    WebSocketConfig, WebhookConfig,
};
