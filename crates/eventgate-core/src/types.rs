//! Persisted data model for event streams, listeners, and checkpoints.
//!
//! All structs serialize camelCase, matching the JSON carried on the REST
//! surface and stored by the persistence layer. Optional fields distinguish
//! "absent in the request" from a concrete value so the merge rules can tell
//! which fields an update actually set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::duration::ApiDuration;

/// Sink variant for a stream. Unknown values are captured so that
/// validation (not deserialization) reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Websocket,
    Webhook,
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Websocket => write!(f, "websocket"),
            StreamType::Webhook => write!(f, "webhook"),
            StreamType::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Error handling policy when a batch dispatch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandlingMode {
    /// Retry the batch forever (at-least-once, no loss).
    Block,
    /// Retry until the retry timeout elapses, then drop the batch.
    Skip,
}

/// How batches are distributed to websocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    LoadBalance,
    Broadcast,
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributionMode::LoadBalance => write!(f, "load_balance"),
            DistributionMode::Broadcast => write!(f, "broadcast"),
            DistributionMode::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Websocket sink sub-configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_mode: Option<DistributionMode>,
}

/// Webhook sink sub-configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<ApiDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_skip_host_verify: Option<bool>,
    /// Deprecated: integer seconds, migrated into `requestTimeout`.
    #[serde(rename = "requestTimeoutSec", skip_serializing_if = "Option::is_none")]
    pub deprecated_request_timeout_sec: Option<u64>,
}

/// Persistent configuration of one event stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<StreamType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_timeout: Option<ApiDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandlingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_retry_delay: Option<ApiDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_timeout: Option<ApiDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WebSocketConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
    /// Deprecated: integer milliseconds, migrated into `batchTimeout`.
    #[serde(rename = "batchTimeoutMS", skip_serializing_if = "Option::is_none")]
    pub deprecated_batch_timeout_ms: Option<u64>,
    /// Deprecated: integer seconds, migrated into `blockedRetryDelay`.
    #[serde(
        rename = "blockedRetryDelaySec",
        skip_serializing_if = "Option::is_none"
    )]
    pub deprecated_blocked_retry_delay_sec: Option<u64>,
    /// Deprecated: integer seconds, migrated into `retryTimeout`.
    #[serde(rename = "retryTimeoutSec", skip_serializing_if = "Option::is_none")]
    pub deprecated_retry_timeout_sec: Option<u64>,
}

impl StreamSpec {
    /// The stream name, or empty when unset.
    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// A filter subscription inside a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<Uuid>,
    /// Ordered set of opaque filter objects the connector understands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Value>,
    /// Opaque connector options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_block: Option<String>,
    /// Connector-resolved signature fingerprint. Immutable once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Deprecated: single event definition, migrated into `filters[0]`.
    #[serde(rename = "event", skip_serializing_if = "Option::is_none")]
    pub deprecated_event: Option<Value>,
    /// Deprecated: single address, migrated into `filters[0]`.
    #[serde(rename = "address", skip_serializing_if = "Option::is_none")]
    pub deprecated_address: Option<String>,
}

impl ListenerSpec {
    /// Fold the deprecated single-event fields into `filters[0]`.
    ///
    /// No-op when filters are already populated or neither deprecated field
    /// is set, so migration is idempotent at rest.
    pub fn migrate_deprecated_fields(&mut self) {
        if !self.filters.is_empty() {
            self.deprecated_event = None;
            self.deprecated_address = None;
            return;
        }
        if self.deprecated_event.is_none() && self.deprecated_address.is_none() {
            return;
        }
        let mut filter = serde_json::Map::new();
        if let Some(event) = self.deprecated_event.take() {
            filter.insert("event".to_string(), event);
        }
        if let Some(address) = self.deprecated_address.take() {
            filter.insert("address".to_string(), Value::String(address));
        }
        self.filters = vec![Value::Object(filter)];
    }
}

/// Persisted per-listener progress for one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCheckpoint {
    pub stream_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Opaque connector cursor per listener id.
    #[serde(default)]
    pub listeners: HashMap<Uuid, Value>,
}

impl StreamCheckpoint {
    pub fn new(stream_id: Uuid) -> Self {
        StreamCheckpoint {
            stream_id,
            time: None,
            listeners: HashMap::new(),
        }
    }
}
