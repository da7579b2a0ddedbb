//! Mock collaborators shared by the unit tests in this crate.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use eventgate_connector::{
    ConfirmationNotification, ConfirmationsManager, Connector, ConnectorError, ConnectorResult,
    Event, EventId, EventStreamStartRequest, EventWithContext, ListenerAddRequest, ListenerEvent,
    ListenerHwmRequest, ListenerHwmResponse, ListenerStartInfo, ListenerVerifyOptionsRequest,
    ListenerVerifyOptionsResponse,
};
use eventgate_core::{ListenerSpec, StreamCheckpoint, StreamSpec};
use eventgate_persistence::{Persistence, PersistenceError, PersistenceResult};

use crate::action::ActionFn;
use crate::listeners::{ListenerRegistry, ListenerRuntime};
use crate::stream::EventStream;
use crate::websocket::{WebSocketChannels, WebSocketStreamChannels, WsAck};

// ---------------------------------------------------------------
// Connector mock
// ---------------------------------------------------------------

pub(crate) struct StartCapture {
    pub initial_listeners: Vec<ListenerStartInfo>,
    pub events: mpsc::Sender<ListenerEvent>,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub(crate) struct MockConnector {
    signatures: StdMutex<VecDeque<String>>,
    resolved_options: StdMutex<Option<Value>>,
    verify_errors: StdMutex<VecDeque<String>>,
    start_errors: StdMutex<VecDeque<String>>,
    add_errors: StdMutex<VecDeque<String>>,
    remove_errors: StdMutex<VecDeque<String>>,
    starts: StdMutex<Vec<StartCapture>>,
    adds: StdMutex<Vec<ListenerStartInfo>>,
    removes: StdMutex<Vec<Uuid>>,
    hwm_value: StdMutex<Option<Value>>,
    hwm_fail: AtomicBool,
    hwm_calls: AtomicUsize,
    hwm_cancel: StdMutex<Option<CancellationToken>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hwm(self, checkpoint: Value) -> Self {
        *self.hwm_value.lock().unwrap() = Some(checkpoint);
        self
    }

    pub fn fail_hwm(self) -> Self {
        self.hwm_fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn cancel_on_hwm(self, token: CancellationToken) -> Self {
        *self.hwm_cancel.lock().unwrap() = Some(token);
        self
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

    pub fn hwm_calls(&self) -> usize {
        self.hwm_calls.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    pub fn last_start(&self) -> Option<StartCapture> {
        let mut starts = self.starts.lock().unwrap();
        starts.pop()
    }

    pub fn removes(&self) -> Vec<Uuid> {
        self.removes.lock().unwrap().clone()
    }

    pub fn adds(&self) -> Vec<ListenerStartInfo> {
        self.adds.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
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
            .unwrap_or_else(|| "sig".to_string());
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
        if let Some(message) = self.add_errors.lock().unwrap().pop_front() {
            return Err(ConnectorError::Internal(message));
        }
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
        self.hwm_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = self.hwm_cancel.lock().unwrap().clone() {
            token.cancel();
        }
        if self.hwm_fail.load(Ordering::SeqCst) {
            return Err(ConnectorError::Internal("pop".to_string()));
        }
        Ok(ListenerHwmResponse {
            checkpoint: self.hwm_value.lock().unwrap().clone(),
        })
    }
}

// ---------------------------------------------------------------
// Persistence mock
// ---------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MockPersistence {
    checkpoints: StdMutex<HashMap<Uuid, StreamCheckpoint>>,
    writes: StdMutex<Vec<StreamCheckpoint>>,
    write_attempts: AtomicUsize,
    fail_all_writes: AtomicBool,
    write_errors: StdMutex<VecDeque<String>>,
    delete_errors: StdMutex<VecDeque<String>>,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_write(&self, message: &str) {
        self.write_errors
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    /// Every checkpoint write fails until the end of the test.
    pub fn fail_all_writes(&self) {
        self.fail_all_writes.store(true, Ordering::SeqCst);
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_next_delete(&self, message: &str) {
        self.delete_errors
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn last_checkpoint(&self) -> Option<StreamCheckpoint> {
        self.writes.lock().unwrap().last().cloned()
    }

    pub fn stored_checkpoint(&self, stream_id: &Uuid) -> Option<StreamCheckpoint> {
        self.checkpoints.lock().unwrap().get(stream_id).cloned()
    }

    pub fn seed_checkpoint(&self, checkpoint: StreamCheckpoint) {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(checkpoint.stream_id, checkpoint);
    }
}

#[async_trait]
impl Persistence for MockPersistence {
    async fn get_checkpoint(
        &self,
        stream_id: &Uuid,
    ) -> PersistenceResult<Option<StreamCheckpoint>> {
        Ok(self.checkpoints.lock().unwrap().get(stream_id).cloned())
    }

    async fn write_checkpoint(&self, checkpoint: &StreamCheckpoint) -> PersistenceResult<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Internal("pop".to_string()));
        }
        if let Some(message) = self.write_errors.lock().unwrap().pop_front() {
            return Err(PersistenceError::Internal(message));
        }
        self.writes.lock().unwrap().push(checkpoint.clone());
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
// Confirmations mock
// ---------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MockConfirmations {
    notified: AtomicUsize,
    retracted: AtomicUsize,
    fail: bool,
    in_flight: bool,
    check_cancel: StdMutex<Option<CancellationToken>>,
}

impl MockConfirmations {
    /// Confirms every event inline, as if zero confirmations were required.
    pub fn confirm_immediately() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        MockConfirmations {
            fail: true,
            ..Default::default()
        }
    }

    pub fn in_flight() -> Self {
        MockConfirmations {
            in_flight: true,
            ..Default::default()
        }
    }

    pub fn cancel_on_check(self, token: CancellationToken) -> Self {
        *self.check_cancel.lock().unwrap() = Some(token);
        self
    }

    pub fn notified(&self) -> usize {
        self.notified.load(Ordering::SeqCst)
    }

    pub fn retracted(&self) -> usize {
        self.retracted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationsManager for MockConfirmations {
    fn start(&self) {}

    fn stop(&self) {}

    async fn notify(&self, notification: ConfirmationNotification) -> ConnectorResult<()> {
        if self.fail {
            return Err(ConnectorError::Internal("pop".to_string()));
        }
        match notification {
            ConfirmationNotification::Event(n) => {
                self.notified.fetch_add(1, Ordering::SeqCst);
                (n.on_confirmed)(vec![]).await;
            }
            ConfirmationNotification::Retracted(_) => {
                self.retracted.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn check_in_flight(&self, _listener_id: &Uuid) -> bool {
        if let Some(token) = self.check_cancel.lock().unwrap().clone() {
            token.cancel();
        }
        self.in_flight
    }
}

// ---------------------------------------------------------------
// WebSocket hub mock
// ---------------------------------------------------------------

pub(crate) struct HubHandles {
    pub sender_rx: mpsc::Receiver<Vec<EventWithContext>>,
    pub broadcast_rx: mpsc::Receiver<Vec<EventWithContext>>,
    pub ack_tx: mpsc::Sender<WsAck>,
}

struct MockHub {
    channels: WebSocketStreamChannels,
}

impl WebSocketChannels for MockHub {
    fn get_channels(&self, _stream_name: &str) -> WebSocketStreamChannels {
        self.channels.clone()
    }
}

pub(crate) fn mock_hub() -> (Arc<dyn WebSocketChannels>, HubHandles) {
    let (sender, sender_rx) = mpsc::channel(1);
    let (broadcast, broadcast_rx) = mpsc::channel(1);
    let (ack_tx, ack_rx) = mpsc::channel(1);
    (
        Arc::new(MockHub {
            channels: WebSocketStreamChannels {
                sender,
                broadcast,
                receiver: Arc::new(Mutex::new(ack_rx)),
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

pub(crate) struct StreamMocks {
    pub connector: Arc<MockConnector>,
    pub persistence: Arc<MockPersistence>,
    pub hub: HubHandles,
}

pub(crate) async fn make_stream(spec_json: Value) -> (Arc<EventStream>, StreamMocks) {
    let mut spec: StreamSpec = serde_json::from_value(spec_json).unwrap();
    spec.id = Some(Uuid::now_v7());
    let connector = Arc::new(MockConnector::new());
    let persistence = Arc::new(MockPersistence::new());
    let (hub, handles) = mock_hub();
    let stream = EventStream::new(
        &spec,
        connector.clone(),
        persistence.clone(),
        hub,
        None,
        &[],
    )
    .await
    .unwrap();
    (
        stream,
        StreamMocks {
            connector,
            persistence,
            hub: handles,
        },
    )
}

pub(crate) fn registry_with(listener_ids: &[Uuid]) -> ListenerRegistry {
    let mut map = HashMap::new();
    for id in listener_ids {
        map.insert(
            *id,
            ListenerRuntime {
                spec: ListenerSpec {
                    id: Some(*id),
                    name: Some("ut_listener".to_string()),
                    filters: vec![json!({"event": "definition1"})],
                    signature: Some("sig".to_string()),
                    ..Default::default()
                },
                resolved_options: json!({}),
            },
        );
    }
    Arc::new(RwLock::new(map))
}

pub(crate) fn listener_event(listener_id: Uuid, block_number: u64) -> ListenerEvent {
    ListenerEvent {
        removed: false,
        checkpoint: Some(json!({"block": block_number})),
        event: Some(Event {
            id: EventId {
                listener_id,
                block_number,
                transaction_index: 13,
                log_index: 1,
            },
            data: json!({"k1": "v1"}),
            info: json!({"blockNumber": block_number.to_string()}),
        }),
    }
}

pub(crate) fn noop_action() -> ActionFn {
    Arc::new(|_batch, _attempt, _events| Box::pin(async { Ok(()) }))
}

#[allow(clippy::type_complexity)]
pub(crate) fn recording_action() -> (ActionFn, Arc<StdMutex<Vec<Vec<EventWithContext>>>>) {
    let delivered: Arc<StdMutex<Vec<Vec<EventWithContext>>>> = Arc::new(StdMutex::new(Vec::new()));
    let recorded = delivered.clone();
    let action: ActionFn = Arc::new(move |_batch, _attempt, events| {
        let recorded = recorded.clone();
        Box::pin(async move {
            recorded.lock().unwrap().push(events);
            Ok(())
        })
    });
    (action, delivered)
}
