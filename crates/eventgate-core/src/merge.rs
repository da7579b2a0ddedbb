//! Configuration merge and validation for event stream specs.
//!
//! [`merge_stream_config`] is a pure function: it never mutates its inputs,
//! so a validation failure leaves the caller's stored spec untouched. Create
//! (`existing = None`) applies per-type defaults; update overlays only the
//! fields the incoming spec actually set, with `id` and `created` sticky.

use chrono::Utc;

use crate::duration::ApiDuration;
use crate::error::{Result, StreamError};
use crate::types::{DistributionMode, ErrorHandlingMode, StreamSpec, StreamType};

const DEFAULT_BATCH_SIZE: u64 = 50;
const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RETRY_SECS: u64 = 30;
const DEFAULT_WEBHOOK_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Merge an incoming spec over an optional existing one, validate, and
/// report whether anything changed.
pub fn merge_stream_config(
    existing: Option<&StreamSpec>,
    incoming: &StreamSpec,
) -> Result<(StreamSpec, bool)> {
    let mut merged = incoming.clone();
    migrate_deprecated_durations(&mut merged);

    if let Some(old) = existing {
        merged.id = old.id;
        merged.created = old.created;
        merged.name = merged.name.or_else(|| old.name.clone());
        merged.suspended = merged.suspended.or(old.suspended);
        merged.stream_type = merged.stream_type.or_else(|| old.stream_type.clone());
        merged.batch_size = merged.batch_size.or(old.batch_size);
        merged.batch_timeout = merged.batch_timeout.or(old.batch_timeout);
        merged.error_handling = merged.error_handling.or(old.error_handling);
        merged.blocked_retry_delay = merged.blocked_retry_delay.or(old.blocked_retry_delay);
        merged.retry_timeout = merged.retry_timeout.or(old.retry_timeout);
        merged.websocket = merged.websocket.or_else(|| old.websocket.clone());
        merged.webhook = merged.webhook.or_else(|| old.webhook.clone());
    }

    if merged.name.as_deref().unwrap_or("").is_empty() {
        return Err(StreamError::MissingName);
    }

    let stream_type = merged
        .stream_type
        .get_or_insert(StreamType::Websocket)
        .clone();
    if let StreamType::Other(unknown) = &stream_type {
        return Err(StreamError::BadStreamType(unknown.clone()));
    }

    merged.suspended.get_or_insert(false);
    merged.batch_size.get_or_insert(DEFAULT_BATCH_SIZE);
    merged
        .batch_timeout
        .get_or_insert(ApiDuration::from_secs(DEFAULT_BATCH_TIMEOUT_SECS));
    merged.error_handling.get_or_insert(ErrorHandlingMode::Block);
    merged
        .blocked_retry_delay
        .get_or_insert(ApiDuration::from_secs(DEFAULT_RETRY_SECS));
    merged
        .retry_timeout
        .get_or_insert(ApiDuration::from_secs(DEFAULT_RETRY_SECS));

    // Only the sink config matching the stream type survives the merge.
    match stream_type {
        StreamType::Websocket => {
            merged.webhook = None;
            let ws = merged.websocket.get_or_insert_with(Default::default);
            let mode = ws
                .distribution_mode
                .get_or_insert(DistributionMode::LoadBalance);
            if let DistributionMode::Other(unknown) = mode {
                return Err(StreamError::BadDistributionMode(unknown.clone()));
            }
        }
        StreamType::Webhook => {
            merged.websocket = None;
            let wh = merged
                .webhook
                .as_mut()
                .ok_or_else(|| StreamError::MissingSinkConfig("webhook".to_string()))?;
            if wh.url.as_deref().unwrap_or("").is_empty() {
                return Err(StreamError::MissingSinkConfig("webhook".to_string()));
            }
            wh.request_timeout
                .get_or_insert(ApiDuration::from_secs(DEFAULT_WEBHOOK_REQUEST_TIMEOUT_SECS));
            wh.tls_skip_host_verify.get_or_insert(false);
        }
        StreamType::Other(_) => unreachable!("validated above"),
    }

    let changed = match existing {
        None => {
            let now = Utc::now();
            merged.created.get_or_insert(now);
            merged.updated = merged.created;
            true
        }
        Some(old) => {
            merged.updated = old.updated;
            let changed = serde_json::to_value(&merged).ok() != serde_json::to_value(old).ok();
            if changed {
                merged.updated = Some(Utc::now());
            }
            changed
        }
    };

    Ok((merged, changed))
}

/// Fold deprecated integer duration fields into their canonical string
/// counterparts. The canonical field wins when both are present.
fn migrate_deprecated_durations(spec: &mut StreamSpec) {
    if spec.batch_timeout.is_none() {
        spec.batch_timeout = spec.deprecated_batch_timeout_ms.map(ApiDuration::from_millis);
    }
    spec.deprecated_batch_timeout_ms = None;

    if spec.blocked_retry_delay.is_none() {
        spec.blocked_retry_delay = spec
            .deprecated_blocked_retry_delay_sec
            .map(ApiDuration::from_secs);
    }
    spec.deprecated_blocked_retry_delay_sec = None;

    if spec.retry_timeout.is_none() {
        spec.retry_timeout = spec.deprecated_retry_timeout_sec.map(ApiDuration::from_secs);
    }
    spec.deprecated_retry_timeout_sec = None;

    if let Some(wh) = spec.webhook.as_mut() {
        if wh.request_timeout.is_none() {
            wh.request_timeout = wh
                .deprecated_request_timeout_sec
                .map(ApiDuration::from_secs);
        }
        wh.deprecated_request_timeout_sec = None;
    }
}
