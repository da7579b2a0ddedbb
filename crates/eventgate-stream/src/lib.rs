//! Per-stream dispatch runtime for eventgate.
//!
//! An [`EventStream`] connects one chain connector to one delivery sink.
//! While started it runs two cooperative workers: the event loop pulls raw
//! listener events from the connector (optionally gating them through a
//! confirmations manager) and the batch loop groups them by size and time,
//! dispatches each batch to the sink with the configured retry policy, and
//! durably checkpoints per-listener progress.
//!
//! ## Architecture
//!
//! ```text
//! connector ──events──▶ event loop ──▶ (confirmations) ──▶ batch channel
//!                                                              │
//!                                 checkpoint writes ◀── batch loop ──▶ sink
//! ```
//!
//! Lifecycle, listener mutations, and configuration updates are serialized
//! by the stream controller in [`stream`].

mod action;
mod batch_loop;
mod event_loop;
mod listeners;
mod stream;
mod websocket;

pub use listeners::ListenerRuntime;
pub use stream::{EventStream, StreamStatus};
pub use websocket::{WebSocketChannels, WebSocketStreamChannels, WsAck};

#[cfg(test)]
pub(crate) mod testutil;
