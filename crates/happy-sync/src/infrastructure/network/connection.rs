//! Per-server connection lifecycle, observers, and request multiplexing.
//!
//! A [`ServerConnection`] owns everything the app holds against one server:
//! the reconnecting transport link, the status observers, the named-event
//! handlers, per-entity data keys, received-message dedup sets, and the
//! per-session reconciliation tasks. Connections are cheap handles over a
//! shared core, so they clone freely into tasks and callbacks.
//!
//! # Status model
//!
//! The connection is always in exactly one of four states —
//! `disconnected`, `connecting`, `connected`, `error` — and observers are
//! only told when the state actually changes. `error` is not terminal: the
//! transport keeps retrying underneath it and the next successful handshake
//! moves the connection back to `connected`.
//!
//! # Encrypted RPC
//!
//! [`session_rpc`](ServerConnection::session_rpc) and
//! [`machine_rpc`](ServerConnection::machine_rpc) seal their parameters
//! with the entity's cipher before anything touches the wire, and unseal
//! the acknowledgement on the way back. A missing cipher fails the call
//! before the transport is involved.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use happy_core::protocol::constants::RPC_CALL_EVENT;
use happy_core::{composite_method, AuthCredentials, EntityKind};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infrastructure::encryption::{CipherError, EncryptionContext};
use crate::infrastructure::network::reconcile::ReconcileTask;
use crate::infrastructure::network::transport::{
    ConnectOptions, Transport, TransportError, TransportEvent, TransportHandle,
};

/// Connection lifecycle state, as reported to status observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport is open (initial state, or after `disconnect`).
    Disconnected,
    /// A transport is open and working toward a handshake.
    Connecting,
    /// The handshake completed; traffic flows.
    Connected,
    /// The transport reported a failure; retries continue underneath.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Handle for unregistering an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Error type for encrypted RPC calls.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No cipher is registered for the target entity. Nothing was sent.
    #[error("no encryption context for {kind} {entity_id}")]
    MissingEncryption {
        kind: EntityKind,
        entity_id: String,
    },

    /// No transport is open.
    #[error("transport is not connected")]
    NotConnected,

    /// The server acknowledged the call as failed.
    #[error("remote rejected the call")]
    Failed,

    /// The acknowledgement did not have the expected shape.
    #[error("malformed acknowledgement")]
    BadAck,

    /// The transport failed to carry the call.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Sealing or unsealing the payload failed.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// The payload or result could not be (de)serialized.
    #[error("payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),

    /// The acknowledged ciphertext was not valid base64.
    #[error("ciphertext encoding failure: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// Error type for authenticated HTTP passthrough requests.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The stored bearer token cannot be used as a header value.
    #[error("bearer token is not a valid header value")]
    InvalidToken,

    /// The HTTP client failed.
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Options for an authenticated HTTP passthrough request.
#[derive(Debug, Default)]
pub struct HttpOptions {
    /// HTTP method; defaults to GET.
    pub method: reqwest::Method,
    /// Extra headers. A caller-supplied `Authorization` replaces the
    /// injected bearer token.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Optional request body.
    pub body: Option<Vec<u8>>,
}

impl HttpOptions {
    /// `GET` with no extra headers and no body.
    pub fn get() -> Self {
        Self::default()
    }

    /// `POST` carrying `body`.
    pub fn post(body: Vec<u8>) -> Self {
        Self {
            method: reqwest::Method::POST,
            headers: Vec::new(),
            body: Some(body),
        }
    }
}

type StatusObserver = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;
type ReconnectObserver = Arc<dyn Fn() + Send + Sync>;
type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Current status and its observers, guarded together so a subscription
/// sees a coherent "current value now, every change after" sequence.
struct StatusCell {
    current: ConnectionStatus,
    observers: BTreeMap<u64, StatusObserver>,
}

struct Link {
    // Distinguishes this link from any earlier or later one, so events
    // pumped out of a torn-down transport can be recognized as stale.
    generation: u64,
    handle: Arc<dyn TransportHandle>,
    pump: JoinHandle<()>,
}

struct ConnectionInner {
    server_url: String,
    credentials: Mutex<AuthCredentials>,
    encryption: Arc<dyn EncryptionContext>,
    transport: Arc<dyn Transport>,
    http: reqwest::Client,
    link: Mutex<Option<Link>>,
    status: Mutex<StatusCell>,
    reconnected_observers: Mutex<BTreeMap<u64, ReconnectObserver>>,
    message_handlers: Mutex<HashMap<String, MessageHandler>>,
    data_keys: Mutex<HashMap<(EntityKind, String), Vec<u8>>>,
    received_messages: Mutex<HashMap<String, HashSet<String>>>,
    reconcilers: Mutex<HashMap<String, ReconcileTask>>,
    next_observer_id: AtomicU64,
    next_link_generation: AtomicU64,
}

impl ConnectionInner {
    fn set_status(&self, next: ConnectionStatus) {
        let observers: Vec<StatusObserver> = {
            let mut cell = self.status.lock();
            if cell.current == next {
                return;
            }
            debug!(server = %self.server_url, from = %cell.current, to = %next, "status change");
            cell.current = next;
            cell.observers.values().cloned().collect()
        };
        for observer in observers {
            observer(next);
        }
    }

    /// Applies a status change on behalf of the pump for link `generation`.
    ///
    /// `abort` only cancels the pump at its next await point, so a pump
    /// iteration that already dequeued an event can outlive the teardown.
    /// The write happens under the link lock and only while the pump's own
    /// link is still installed, which keeps such a straggler from
    /// overwriting the settled `disconnected` (or the `connecting` of a
    /// recycled link). Returns whether the write applied.
    fn set_status_if_current(&self, generation: u64, next: ConnectionStatus) -> bool {
        let link = self.link.lock();
        if link.as_ref().map(|link| link.generation) != Some(generation) {
            debug!(server = %self.server_url, status = %next, "dropping status event from torn-down transport");
            return false;
        }
        self.set_status(next);
        true
    }

    fn notify_reconnected(&self) {
        let observers: Vec<ReconnectObserver> =
            self.reconnected_observers.lock().values().cloned().collect();
        for observer in observers {
            observer();
        }
    }
}

/// Connection to one server. Cloning yields another handle to the same
/// connection.
#[derive(Clone)]
pub struct ServerConnection {
    inner: Arc<ConnectionInner>,
}

impl ServerConnection {
    /// Creates a connection for `server_url` in the `disconnected` state.
    /// Nothing touches the network until [`connect`](Self::connect).
    pub fn new(
        server_url: impl Into<String>,
        credentials: AuthCredentials,
        encryption: Arc<dyn EncryptionContext>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                server_url: server_url.into(),
                credentials: Mutex::new(credentials),
                encryption,
                transport,
                http: reqwest::Client::new(),
                link: Mutex::new(None),
                status: Mutex::new(StatusCell {
                    current: ConnectionStatus::Disconnected,
                    observers: BTreeMap::new(),
                }),
                reconnected_observers: Mutex::new(BTreeMap::new()),
                message_handlers: Mutex::new(HashMap::new()),
                data_keys: Mutex::new(HashMap::new()),
                received_messages: Mutex::new(HashMap::new()),
                reconcilers: Mutex::new(HashMap::new()),
                next_observer_id: AtomicU64::new(0),
                next_link_generation: AtomicU64::new(0),
            }),
        }
    }

    /// The server this connection targets.
    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }

    /// The credentials currently used for the transport handshake and HTTP
    /// passthrough.
    pub fn credentials(&self) -> AuthCredentials {
        self.inner.credentials.lock().clone()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.lock().current
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Opens the transport and starts pumping its events. A no-op when a
    /// transport is already open.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut link = self.inner.link.lock();
        if link.is_some() {
            return;
        }
        self.inner.set_status(ConnectionStatus::Connecting);
        let options = ConnectOptions::new(
            self.inner.server_url.clone(),
            self.inner.credentials.lock().token.clone(),
        );
        let generation = self
            .inner
            .next_link_generation
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        let (handle, events) = self.inner.transport.open(&options);
        let pump = tokio::spawn(pump_events(Arc::clone(&self.inner), generation, events));
        *link = Some(Link {
            generation,
            handle,
            pump,
        });
        info!(server = %self.inner.server_url, "transport opened");
    }

    /// Closes the transport, stops every session reconciler, and settles in
    /// `disconnected`. Safe to call repeatedly; a second call changes
    /// nothing and notifies nobody. The settled status holds until the next
    /// [`connect`](Self::connect): a handshake that completes on the old
    /// transport concurrently with the teardown is recognized as stale and
    /// dropped.
    ///
    /// Data keys, received-message records, and registered handlers and
    /// observers all survive, so a later [`connect`](Self::connect) resumes
    /// with the same wiring.
    pub fn disconnect(&self) {
        let link = self.inner.link.lock().take();
        if let Some(link) = link {
            link.pump.abort();
            link.handle.close();
            info!(server = %self.inner.server_url, "transport closed");
        }
        let tasks: Vec<ReconcileTask> = {
            let mut reconcilers = self.inner.reconcilers.lock();
            reconcilers.drain().map(|(_, task)| task).collect()
        };
        for task in &tasks {
            task.stop();
        }
        self.inner.set_status(ConnectionStatus::Disconnected);
    }

    /// Replaces the bearer token. When the new token differs and a
    /// transport is open, the connection tears it down and reconnects so
    /// the server sees the new token at the handshake. The same token is a
    /// no-op.
    pub fn update_token(&self, token: &str) {
        {
            let mut credentials = self.inner.credentials.lock();
            if credentials.token == token {
                return;
            }
            credentials.token = token.to_string();
        }
        let open = self.inner.link.lock().is_some();
        if open {
            info!(server = %self.inner.server_url, "token rotated, recycling transport");
            self.disconnect();
            self.connect();
        }
    }

    // ── Observers ─────────────────────────────────────────────────────────────

    /// Registers a status observer.
    ///
    /// The observer is invoked inline with the current status before this
    /// returns, then again on every status change (never for a repeat of
    /// the same status). The callback must not call back into the
    /// connection.
    pub fn on_status_change<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let observer: StatusObserver = Arc::new(observer);
        let mut cell = self.inner.status.lock();
        cell.observers.insert(id, Arc::clone(&observer));
        observer(cell.current);
        ObserverId(id)
    }

    /// Unregisters a status observer. Unknown ids are ignored.
    pub fn remove_status_observer(&self, id: ObserverId) {
        self.inner.status.lock().observers.remove(&id.0);
    }

    /// Registers an observer for completed cold reconnects: handshakes
    /// where the server did **not** recover the previous session, so the
    /// app must assume it missed events. Recovered reconnects stay silent.
    pub fn on_reconnected<F>(&self, observer: F) -> ObserverId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .reconnected_observers
            .lock()
            .insert(id, Arc::new(observer));
        ObserverId(id)
    }

    /// Unregisters a reconnect observer. Unknown ids are ignored.
    pub fn remove_reconnected_observer(&self, id: ObserverId) {
        self.inner.reconnected_observers.lock().remove(&id.0);
    }

    /// Registers the handler for a named server event, replacing any
    /// previous handler for the same name.
    pub fn on_message<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner
            .message_handlers
            .lock()
            .insert(event.into(), Arc::new(handler));
    }

    /// Removes the handler for a named server event, if any.
    pub fn remove_message_handler(&self, event: &str) {
        self.inner.message_handlers.lock().remove(event);
    }

    // ── Encrypted RPC ─────────────────────────────────────────────────────────

    /// Calls `method` on a session over the encrypted RPC channel.
    pub async fn session_rpc<P, R>(
        &self,
        session_id: &str,
        method: &str,
        params: &P,
    ) -> Result<R, RpcError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.entity_rpc(EntityKind::Session, session_id, method, params)
            .await
    }

    /// Calls `method` on a machine over the encrypted RPC channel.
    pub async fn machine_rpc<P, R>(
        &self,
        machine_id: &str,
        method: &str,
        params: &P,
    ) -> Result<R, RpcError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.entity_rpc(EntityKind::Machine, machine_id, method, params)
            .await
    }

    async fn entity_rpc<P, R>(
        &self,
        kind: EntityKind,
        entity_id: &str,
        method: &str,
        params: &P,
    ) -> Result<R, RpcError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        // Resolve the cipher before anything else; a missing cipher must
        // fail the call without a wire round trip.
        let cipher = self
            .inner
            .encryption
            .entity_cipher(kind, entity_id)
            .ok_or_else(|| RpcError::MissingEncryption {
                kind,
                entity_id: entity_id.to_string(),
            })?;
        let handle = self
            .inner
            .link
            .lock()
            .as_ref()
            .map(|link| Arc::clone(&link.handle))
            .ok_or(RpcError::NotConnected)?;

        let plain = serde_json::to_vec(params)?;
        let sealed = cipher.encrypt_raw(&plain).await?;
        let request = json!({
            "method": composite_method(entity_id, method),
            "params": BASE64_STANDARD.encode(sealed),
        });

        let ack = handle.emit_with_ack(RPC_CALL_EVENT, request).await?;
        if !ack.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            warn!(server = %self.inner.server_url, %kind, entity = %entity_id, method, "rpc rejected");
            return Err(RpcError::Failed);
        }
        let sealed_result = ack
            .get("result")
            .and_then(Value::as_str)
            .ok_or(RpcError::BadAck)?;
        let plain_result = cipher.decrypt_raw(&BASE64_STANDARD.decode(sealed_result)?).await?;
        Ok(serde_json::from_slice(&plain_result)?)
    }

    /// Emits a named event without waiting for a response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when no transport is open.
    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        let handle = self
            .inner
            .link
            .lock()
            .as_ref()
            .map(|link| Arc::clone(&link.handle))
            .ok_or(TransportError::Closed)?;
        handle.emit(event, payload).await
    }

    // ── HTTP passthrough ──────────────────────────────────────────────────────

    /// Sends an HTTP request to `path` on this server, with the bearer
    /// token injected. Works regardless of the transport's state.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] when the token is unusable as a header value
    /// or the request itself fails.
    pub async fn request(
        &self,
        path: &str,
        options: HttpOptions,
    ) -> Result<reqwest::Response, HttpError> {
        let url = format!("{}{}", self.inner.server_url, path);
        let token = self.inner.credentials.lock().token.clone();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| HttpError::InvalidToken)?,
        );
        for (name, value) in options.headers {
            headers.insert(name, value);
        }
        let mut builder = self.inner.http.request(options.method, url).headers(headers);
        if let Some(body) = options.body {
            builder = builder.body(body);
        }
        Ok(builder.send().await?)
    }

    // ── Per-entity state ──────────────────────────────────────────────────────

    /// Stores the content data key for an entity, replacing any previous
    /// key. Keys survive disconnects.
    pub fn store_data_key(&self, kind: EntityKind, entity_id: &str, key: Vec<u8>) {
        self.inner
            .data_keys
            .lock()
            .insert((kind, entity_id.to_string()), key);
    }

    /// Returns the stored content data key for an entity.
    pub fn data_key(&self, kind: EntityKind, entity_id: &str) -> Option<Vec<u8>> {
        self.inner
            .data_keys
            .lock()
            .get(&(kind, entity_id.to_string()))
            .cloned()
    }

    /// Records that `message_id` arrived for `session_id`. Returns `true`
    /// the first time, `false` for a repeat, so push paths can drop
    /// duplicates.
    pub fn mark_message_received(&self, session_id: &str, message_id: &str) -> bool {
        self.inner
            .received_messages
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .insert(message_id.to_string())
    }

    /// Installs the reconciliation task for a session, stopping and
    /// replacing any previous one.
    pub fn set_session_reconciler(&self, session_id: &str, task: ReconcileTask) {
        let previous = self
            .inner
            .reconcilers
            .lock()
            .insert(session_id.to_string(), task);
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    /// Pokes the session's reconciliation task, if one is installed.
    pub fn invalidate_session(&self, session_id: &str) {
        if let Some(task) = self.inner.reconcilers.lock().get(session_id) {
            task.invalidate();
        } else {
            debug!(server = %self.inner.server_url, session = %session_id, "no reconciler installed");
        }
    }
}

async fn pump_events(
    inner: Arc<ConnectionInner>,
    generation: u64,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Connected { recovered } => {
                let applied =
                    inner.set_status_if_current(generation, ConnectionStatus::Connected);
                if applied && !recovered {
                    debug!(server = %inner.server_url, "cold handshake, notifying reconnect observers");
                    inner.notify_reconnected();
                }
            }
            TransportEvent::Disconnected => {
                inner.set_status_if_current(generation, ConnectionStatus::Disconnected);
            }
            TransportEvent::ConnectError { message } => {
                warn!(server = %inner.server_url, error = %message, "transport error");
                inner.set_status_if_current(generation, ConnectionStatus::Error);
            }
            TransportEvent::Message { event, payload } => {
                let handler = inner.message_handlers.lock().get(&event).cloned();
                match handler {
                    Some(handler) => handler(payload),
                    None => {
                        debug!(server = %inner.server_url, event = %event, "no handler for event")
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
