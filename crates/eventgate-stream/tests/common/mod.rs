//! Mock collaborators and helpers for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use eventgate_connector::{
    Connector, ConnectorError, ConnectorResult, Event, EventId, EventStreamStartRequest,
    EventWithContext, ListenerAddRequest, ListenerEvent, ListenerHwmRequest, ListenerHwmResponse,
    ListenerStartInfo, ListenerVerifyOptionsRequest, ListenerVerifyOptionsResponse,
};
use eventgate_core::{ListenerSpec, StreamCheckpoint, StreamSpec};
use eventgate_persistence::{Persistence, PersistenceError, PersistenceResult};
use eventgate_stream::{EventStream, WebSocketChannels, WebSocketStreamChannels, WsAck};

// ---------------------------------------------------------------
// Connector
// ---------------------------------------------------------------

pub struct StartCapture {
    pub initial_listeners: Vec<ListenerStartInfo>,
    pub events: mpsc::Sender<ListenerEvent>,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct TestConnector {
    signatures: Mutex<VecDeque<String>>,
    resolved_options: Mutex<Option<Value>>,
    verify_errors: Mutex<VecDeque<String>>,
    start_errors: Mutex<VecDeque<String>>,
    remove_errors: Mutex<VecDeque<String>>,
    starts: Mutex<Vec<StartCapture>>,
    adds: Mutex<Vec<ListenerStartInfo>>,
    removes: Mutex<Vec<Uuid>>,
    hwm_value: Mutex<Option<Value>>,
}

impl TestConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_signature(&self, signature: &str) {
        self.signatures
            .lock()
            .unwrap()
            .push_back(signature.to_string());
    }

    pub fn set_resolved_options(&self, options: Value) {
        *self.resolved_options.lock().unwrap() = Some(options);
    }

    pub fn set_hwm(&self, checkpoint: Value) {
        *self.hwm_value.lock().unwrap() = Some(checkpoint);
    }

    pub fn fail_next_verify(&self, message: &str) {
        self.verify_errors
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn fail_next_start(&self, message: &str) {
        self.start_errors
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn fail_next_remove(&self, message: &str) {
        self.remove_errors
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    pub fn take_last_start(&self) -> StartCapture {
        self.starts
            .lock()
            .unwrap()
            .pop()
            .expect("no captured stream start")
    }

    pub fn adds(&self) -> Vec<ListenerStartInfo> {
        self.adds.lock().unwrap().clone()
    }

    pub fn removes(&self) -> Vec<Uuid> {
        self.removes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn event_listener_verify_options(
        &self,
        request: ListenerVerifyOptionsRequest,
    ) -> ConnectorResult<ListenerVerifyOptionsResponse> {
        if let Some(message) = self.verify_errors.lock().unwrap().pop_front() {
            return Err(ConnectorError::Internal(message));
        }
        let resolved_signature = self
            .signatures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "EventSig(uint256)".to_string());
        let resolved_options = self
            .resolved_options
            .lock()
            .unwrap()
            .clone()
            .or(request.options)
            .unwrap_or_else(|| json!({}));
        Ok(ListenerVerifyOptionsResponse {
            resolved_signature,
            resolved_options,
        })
    }

    async fn event_stream_start(&self, request: EventStreamStartRequest) -> ConnectorResult<()> {
        self.starts.lock().unwrap().push(StartCapture {
            initial_listeners: request.initial_listeners,
            events: request.events,
            cancel: request.cancel,
        });
        if let Some(message) = self.start_errors.lock().unwrap().pop_front() {
            return Err(ConnectorError::Internal(message));
        }
        Ok(())
    }

    async fn event_listener_add(&self, request: ListenerAddRequest) -> ConnectorResult<()> {
        self.adds.lock().unwrap().push(request);
        Ok(())
    }

    async fn event_listener_remove(&self, listener_id: &Uuid) -> ConnectorResult<()> {
        self.removes.lock().unwrap().push(*listener_id);
        if let Some(message) = self.remove_errors.lock().unwrap().pop_front() {
            return Err(ConnectorError::Internal(message));
        }
        Ok(())
    }

    async fn event_listener_hwm(
        &self,
        _request: ListenerHwmRequest,
    ) -> ConnectorResult<ListenerHwmResponse> {
        Ok(ListenerHwmResponse {
            checkpoint: self.hwm_value.lock().unwrap().clone(),
        })
    }
}

// ---------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------

#[derive(Default)]
pub struct TestPersistence {
    checkpoints: Mutex<HashMap<Uuid, StreamCheckpoint>>,
    write_count: AtomicUsize,
    write_errors: Mutex<VecDeque<String>>,
    delete_errors: Mutex<VecDeque<String>>,
}

impl TestPersistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_write(&self, message: &str) {
        self.write_errors
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn fail_next_delete(&self, message: &str) {
        self.delete_errors
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn checkpoint(&self, stream_id: &Uuid) -> Option<StreamCheckpoint> {
        self.checkpoints.lock().unwrap().get(stream_id).cloned()
    }

    pub fn seed(&self, checkpoint: StreamCheckpoint) {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(checkpoint.stream_id, checkpoint);
    }

    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Persistence for TestPersistence {
    async fn get_checkpoint(
        &self,
        stream_id: &Uuid,
    ) -> PersistenceResult<Option<StreamCheckpoint>> {
        Ok(self.checkpoints.lock().unwrap().get(stream_id).cloned())
    }

    async fn write_checkpoint(&self, checkpoint: &StreamCheckpoint) -> PersistenceResult<()> {
        if let Some(message) = self.write_errors.lock().unwrap().pop_front() {
            return Err(PersistenceError::Internal(message));
        }
        self.write_count.fetch_add(1, Ordering::SeqCst);
        self.checkpoints
            .lock()
            .unwrap()
            .insert(checkpoint.stream_id, checkpoint.clone());
        Ok(())
    }

    async fn delete_checkpoint(&self, stream_id: &Uuid) -> PersistenceResult<()> {
        if let Some(message) = self.delete_errors.lock().unwrap().pop_front() {
            return Err(PersistenceError::Internal(message));
        }
        self.checkpoints.lock().unwrap().remove(stream_id);
        Ok(())
    }

    async fn write_stream(&self, _spec: &StreamSpec) -> PersistenceResult<()> {
        Ok(())
    }

    async fn get_streams(&self) -> PersistenceResult<Vec<StreamSpec>> {
        Ok(vec![])
    }

    async fn delete_stream(&self, _stream_id: &Uuid) -> PersistenceResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------
// WebSocket hub
// ---------------------------------------------------------------

pub struct HubHandles {
    pub sender_rx: mpsc::Receiver<Vec<EventWithContext>>,
    pub broadcast_rx: mpsc::Receiver<Vec<EventWithContext>>,
    pub ack_tx: mpsc::Sender<WsAck>,
}

struct TestHub {
    channels: WebSocketStreamChannels,
}

impl WebSocketChannels for TestHub {
    fn get_channels(&self, _stream_name: &str) -> WebSocketStreamChannels {
        self.channels.clone()
    }
}

pub fn test_hub() -> (Arc<dyn WebSocketChannels>, HubHandles) {
    let (sender, sender_rx) = mpsc::channel(1);
    let (broadcast, broadcast_rx) = mpsc::channel(1);
    let (ack_tx, ack_rx) = mpsc::channel(1);
    (
        Arc::new(TestHub {
            channels: WebSocketStreamChannels {
                sender,
                broadcast,
                receiver: Arc::new(tokio::sync::Mutex::new(ack_rx)),
            },
        }),
        HubHandles {
            sender_rx,
            broadcast_rx,
            ack_tx,
        },
    )
}

// ---------------------------------------------------------------
// Builders
// ---------------------------------------------------------------

pub struct TestStream {
    pub stream: Arc<EventStream>,
    pub connector: Arc<TestConnector>,
    pub persistence: Arc<TestPersistence>,
    pub hub: HubHandles,
}

pub fn stream_spec(spec_json: Value) -> StreamSpec {
    let mut spec: StreamSpec = serde_json::from_value(spec_json).expect("valid spec json");
    if spec.id.is_none() {
        spec.id = Some(Uuid::now_v7());
    }
    spec
}

pub async fn new_test_stream(spec_json: Value) -> TestStream {
    new_test_stream_with_listeners(spec_json, &[]).await
}

pub async fn new_test_stream_with_listeners(
    spec_json: Value,
    listeners: &[ListenerSpec],
) -> TestStream {
    let connector = TestConnector::new();
    let persistence = TestPersistence::new();
    let (hub, handles) = test_hub();
    let stream = EventStream::new(
        &stream_spec(spec_json),
        connector.clone(),
        persistence.clone(),
        hub,
        None,
        listeners,
    )
    .await
    .expect("stream construction");
    TestStream {
        stream,
        connector,
        persistence,
        hub: handles,
    }
}

pub fn test_listener(filters: Vec<Value>) -> ListenerSpec {
    ListenerSpec {
        id: Some(Uuid::now_v7()),
        name: Some("ut_listener".to_string()),
        filters,
        ..Default::default()
    }
}

pub fn listener_event(listener_id: Uuid, block_number: u64, cursor: Value) -> ListenerEvent {
    ListenerEvent {
        removed: false,
        checkpoint: Some(cursor),
        event: Some(Event {
            id: EventId {
                listener_id,
                block_number,
                transaction_index: 13,
                log_index: 1,
            },
            data: json!({"k1": "v1"}),
            info: json!({
                "blockNumber": block_number.to_string(),
                "transactionIndex": "13",
                "logIndex": "1"
            }),
        }),
    }
}

/// Poll until `condition` holds, failing the test after a few seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
