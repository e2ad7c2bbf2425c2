//! Mock transport for unit and integration testing.
//!
//! Lets tests act as the server side of a [`ServerConnection`]: feed it
//! lifecycle and message events, script acknowledgement responses, and
//! inspect everything the connection emitted or how often it opened and
//! closed the transport.
//!
//! [`ServerConnection`]: super::ServerConnection

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::transport::{
    ConnectOptions, Transport, TransportError, TransportEvent, TransportHandle,
    EVENT_CHANNEL_CAPACITY,
};

#[derive(Default)]
struct MockState {
    sender: Option<mpsc::Sender<TransportEvent>>,
    opens: Vec<ConnectOptions>,
    emitted: Vec<(String, Value)>,
    acks: VecDeque<Result<Value, TransportError>>,
    closed: usize,
}

/// A mock [`Transport`] that tests drive by hand.
#[derive(Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a mock transport with nothing scripted.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delivers `event` to the currently open connection, as if it came
    /// from the server. Returns `false` when no transport is open or the
    /// consumer is gone.
    pub async fn push_event(&self, event: TransportEvent) -> bool {
        let sender = self.state.lock().sender.clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Queues the response for the next `emit_with_ack` call. Responses are
    /// consumed in order; an unscripted call fails with an ack error.
    pub fn queue_ack(&self, response: Result<Value, TransportError>) {
        self.state.lock().acks.push_back(response);
    }

    /// How many times `open` was called.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    /// The options passed to the most recent `open`.
    pub fn last_open(&self) -> Option<ConnectOptions> {
        self.state.lock().opens.last().cloned()
    }

    /// How many times a handle was closed.
    pub fn close_count(&self) -> usize {
        self.state.lock().closed
    }

    /// Every `(event, payload)` emitted through any handle, oldest first.
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.state.lock().emitted.clone()
    }
}

impl Transport for MockTransport {
    fn open(
        &self,
        options: &ConnectOptions,
    ) -> (Arc<dyn TransportHandle>, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut state = self.state.lock();
        state.sender = Some(tx);
        state.opens.push(options.clone());
        let handle = MockHandle {
            state: Arc::clone(&self.state),
        };
        (Arc::new(handle), rx)
    }
}

struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

#[async_trait::async_trait]
impl TransportHandle for MockHandle {
    async fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        self.state.lock().emitted.push((event.to_string(), payload));
        Ok(())
    }

    async fn emit_with_ack(&self, event: &str, payload: Value) -> Result<Value, TransportError> {
        let mut state = self.state.lock();
        state.emitted.push((event.to_string(), payload));
        state
            .acks
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Ack("no acknowledgement scripted".into())))
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closed += 1;
        // Dropping the sender closes the event channel, like a torn-down
        // socket would.
        state.sender = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
