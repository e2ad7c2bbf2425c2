//! Integration tests for the server connection lifecycle.
//!
//! # Purpose
//!
//! These tests drive a [`ServerConnection`] through its public API with a
//! hand-controlled mock transport playing the server. They verify:
//!
//! - The status machine: observers get the current status immediately, then
//!   every distinct change, and never a repeat.
//! - Reconnect semantics: cold handshakes (no session recovery) notify the
//!   reconnect observers, recovered handshakes stay silent.
//! - Encrypted RPC: parameters are sealed before they reach the wire, a
//!   missing cipher or transport fails before anything is sent, and every
//!   acknowledgement shape maps to the right error.
//! - Event dispatch: one handler per event name, last registration wins,
//!   and wiring survives a disconnect/reconnect cycle.
//! - Token rotation: a changed token recycles the transport, the same
//!   token changes nothing.
//!
//! The mock transport does no I/O; tests push [`TransportEvent`]s by hand
//! and synchronize on observer callbacks forwarded into channels, so there
//! are no sleeps on the happy paths.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use happy_core::{AuthCredentials, EntityKind};
use happy_sync::infrastructure::encryption::mock::MockEncryption;
use happy_sync::infrastructure::network::mock::MockTransport;
use happy_sync::{
    ConnectionStatus, HttpError, HttpOptions, ReconcileTask, RpcError, ServerConnection,
    TransportError, TransportEvent,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn tracing_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn credentials() -> AuthCredentials {
    AuthCredentials {
        token: "tok-1".to_string(),
        secret: "sec-1".to_string(),
    }
}

fn fixture() -> (Arc<MockTransport>, Arc<MockEncryption>, ServerConnection) {
    tracing_init();
    let transport = MockTransport::new();
    let encryption = MockEncryption::new(vec![0xaa, 0xbb]);
    let connection = ServerConnection::new(
        "https://api.happy.engineering",
        credentials(),
        encryption.clone(),
        transport.clone(),
    );
    (transport, encryption, connection)
}

/// Forwards every status notification into a channel the test can await.
fn status_channel(connection: &ServerConnection) -> mpsc::UnboundedReceiver<ConnectionStatus> {
    let (tx, rx) = mpsc::unbounded_channel();
    connection.on_status_change(move |status| {
        let _ = tx.send(status);
    });
    rx
}

/// Forwards every reconnect notification into a channel the test can await.
fn reconnected_channel(connection: &ServerConnection) -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    connection.on_reconnected(move || {
        let _ = tx.send(());
    });
    rx
}

async fn next_status(rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>) -> ConnectionStatus {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("status notification in time")
        .expect("status channel open")
}

async fn next_unit(rx: &mut mpsc::UnboundedReceiver<()>) {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("notification in time")
        .expect("channel open");
}

// ── Status machine ────────────────────────────────────────────────────────────

/// The canonical lifecycle: subscribe, connect, handshake, drop, recover,
/// disconnect. The observer must see the current status immediately and
/// then exactly one notification per change.
#[tokio::test]
async fn test_full_lifecycle_status_sequence() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    connection.connect();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connecting);

    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);

    transport.push_event(TransportEvent::Disconnected).await;
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    transport.push_event(TransportEvent::Connected { recovered: true }).await;
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);

    connection.disconnect();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);
    assert_eq!(transport.close_count(), 1);
}

/// A transport error surfaces as the `error` status, and the next
/// successful handshake moves the connection back to `connected`.
#[tokio::test]
async fn test_transport_error_is_not_terminal() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    connection.connect();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connecting);

    transport
        .push_event(TransportEvent::ConnectError {
            message: "tls handshake refused".to_string(),
        })
        .await;
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Error);

    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);
}

/// Equal consecutive transport events must collapse into a single observer
/// notification.
#[tokio::test]
async fn test_repeated_transport_events_notify_once() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    connection.connect();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connecting);

    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    transport.push_event(TransportEvent::Connected { recovered: true }).await;
    transport.push_event(TransportEvent::Disconnected).await;

    // If the duplicate `Connected` produced a notification, it would arrive
    // before the `Disconnected` one and this sequence would not hold.
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);
}

/// Observers subscribed after changes still start from the current status.
#[tokio::test]
async fn test_late_subscriber_sees_current_status() {
    let (transport, _, connection) = fixture();
    let mut early = status_channel(&connection);
    assert_eq!(next_status(&mut early).await, ConnectionStatus::Disconnected);

    connection.connect();
    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    assert_eq!(next_status(&mut early).await, ConnectionStatus::Connecting);
    assert_eq!(next_status(&mut early).await, ConnectionStatus::Connected);

    let mut late = status_channel(&connection);
    assert_eq!(next_status(&mut late).await, ConnectionStatus::Connected);
}

// ── Reconnect observers ───────────────────────────────────────────────────────

/// Every handshake without session recovery is a cold reconnect and must
/// notify, including the very first connect.
#[tokio::test]
async fn test_cold_handshakes_notify_reconnect_observers() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    let mut reconnects = reconnected_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    connection.connect();
    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    next_unit(&mut reconnects).await;

    transport.push_event(TransportEvent::Disconnected).await;
    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    next_unit(&mut reconnects).await;
}

/// A handshake where the server recovered the session must stay silent.
#[tokio::test]
async fn test_recovered_handshake_is_silent() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    let mut reconnects = reconnected_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    connection.connect();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connecting);
    transport.push_event(TransportEvent::Connected { recovered: true }).await;

    // Synchronize on the status change, then the reconnect channel must
    // still be empty.
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);
    assert!(reconnects.try_recv().is_err(), "recovered handshake must not notify");
}

/// The reconnect notification fires after the status observers saw
/// `connected`, so handlers can already use the connection.
#[tokio::test]
async fn test_reconnect_fires_after_connected_status() {
    let (transport, _, connection) = fixture();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let status_tx = tx.clone();
    connection.on_status_change(move |status| {
        let _ = status_tx.send(format!("status:{status}"));
    });
    connection.on_reconnected(move || {
        let _ = tx.send("reconnected".to_string());
    });

    connection.connect();
    transport.push_event(TransportEvent::Connected { recovered: false }).await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(
            timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("notification in time")
                .expect("channel open"),
        );
    }
    assert_eq!(
        seen,
        vec!["status:disconnected", "status:connecting", "status:connected"]
    );
    assert_eq!(
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("notification in time")
            .expect("channel open"),
        "reconnected"
    );
}

// ── Encrypted RPC ─────────────────────────────────────────────────────────────

/// Happy path: parameters are sealed with the session cipher and encoded,
/// the composite method name multiplexes the session, and the acknowledged
/// result is unsealed and decoded back.
#[tokio::test]
async fn test_session_rpc_round_trip() {
    let (transport, encryption, connection) = fixture();
    encryption.add_entity(EntityKind::Session, "sess-1", 0x2a);
    connection.connect();

    let result_value = json!({"echo": "hi", "exit": 0});
    let sealed_result =
        encryption.xor_for(EntityKind::Session, "sess-1", &serde_json::to_vec(&result_value).unwrap());
    transport.queue_ack(Ok(json!({
        "ok": true,
        "result": BASE64_STANDARD.encode(sealed_result),
    })));

    let params = json!({"command": "echo hi"});
    let result: Value = connection
        .session_rpc("sess-1", "bash", &params)
        .await
        .expect("rpc round trip");
    assert_eq!(result, result_value);

    let emitted = transport.emitted();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].0, "rpc-call");
    assert_eq!(emitted[0].1["method"], "sess-1:bash");
    let expected_params = BASE64_STANDARD.encode(encryption.xor_for(
        EntityKind::Session,
        "sess-1",
        &serde_json::to_vec(&params).unwrap(),
    ));
    assert_eq!(emitted[0].1["params"], Value::String(expected_params));
}

/// Machine RPC uses the machine's own cipher and composite name.
#[tokio::test]
async fn test_machine_rpc_uses_machine_cipher() {
    let (transport, encryption, connection) = fixture();
    encryption.add_entity(EntityKind::Machine, "mach-1", 0x11);
    connection.connect();

    let sealed_result =
        encryption.xor_for(EntityKind::Machine, "mach-1", &serde_json::to_vec(&json!("ok")).unwrap());
    transport.queue_ack(Ok(json!({
        "ok": true,
        "result": BASE64_STANDARD.encode(sealed_result),
    })));

    let result: Value = connection
        .machine_rpc("mach-1", "spawn", &json!({"dir": "/tmp"}))
        .await
        .expect("rpc round trip");
    assert_eq!(result, json!("ok"));
    assert_eq!(transport.emitted()[0].1["method"], "mach-1:spawn");
}

/// An acknowledgement with `ok: false` maps to `RpcError::Failed`.
#[tokio::test]
async fn test_rpc_rejected_ack_fails() {
    let (transport, encryption, connection) = fixture();
    encryption.add_entity(EntityKind::Session, "sess-1", 0x2a);
    connection.connect();
    transport.queue_ack(Ok(json!({"ok": false})));

    let result: Result<Value, RpcError> = connection.session_rpc("sess-1", "bash", &json!({})).await;

    assert!(matches!(result, Err(RpcError::Failed)));
}

/// A positive acknowledgement without a result payload is malformed.
#[tokio::test]
async fn test_rpc_ack_without_result_is_bad_ack() {
    let (transport, encryption, connection) = fixture();
    encryption.add_entity(EntityKind::Session, "sess-1", 0x2a);
    connection.connect();
    transport.queue_ack(Ok(json!({"ok": true})));

    let result: Result<Value, RpcError> = connection.session_rpc("sess-1", "bash", &json!({})).await;

    assert!(matches!(result, Err(RpcError::BadAck)));
}

/// A transport-level acknowledgement failure surfaces as such.
#[tokio::test]
async fn test_rpc_transport_failure_surfaces() {
    let (transport, encryption, connection) = fixture();
    encryption.add_entity(EntityKind::Session, "sess-1", 0x2a);
    connection.connect();
    transport.queue_ack(Err(TransportError::Ack("ack timeout".to_string())));

    let result: Result<Value, RpcError> = connection.session_rpc("sess-1", "bash", &json!({})).await;

    assert!(matches!(result, Err(RpcError::Transport(_))));
}

/// Without a cipher for the entity nothing may reach the transport.
#[tokio::test]
async fn test_rpc_without_cipher_sends_nothing() {
    let (transport, _, connection) = fixture();
    connection.connect();

    let result: Result<Value, RpcError> =
        connection.session_rpc("sess-ghost", "bash", &json!({})).await;

    assert!(matches!(result, Err(RpcError::MissingEncryption { .. })));
    assert!(transport.emitted().is_empty(), "nothing may be emitted");
}

/// Fire-and-forget emission goes out unencrypted as-is.
#[tokio::test]
async fn test_emit_sends_plain_event() {
    let (transport, _, connection) = fixture();
    connection.connect();

    connection.emit("ping", json!({"seq": 1})).await.expect("emit");

    let emitted = transport.emitted();
    assert_eq!(emitted, vec![("ping".to_string(), json!({"seq": 1}))]);
}

// ── Event dispatch ────────────────────────────────────────────────────────────

/// Two registrations for the same event: only the later handler runs.
#[tokio::test]
async fn test_last_message_handler_wins() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    connection.on_message("update", move |payload| {
        let _ = first_tx.send(payload);
    });
    connection.on_message("update", move |payload| {
        let _ = second_tx.send(payload);
    });

    connection.connect();
    transport
        .push_event(TransportEvent::Message {
            event: "update".to_string(),
            payload: json!({"id": 1}),
        })
        .await;

    let payload = timeout(Duration::from_secs(1), second_rx.recv())
        .await
        .expect("second handler runs")
        .expect("channel open");
    assert_eq!(payload, json!({"id": 1}));
    assert!(first_rx.try_recv().is_err(), "replaced handler must not run");
}

/// A removed handler stays silent; other handlers are untouched.
#[tokio::test]
async fn test_removed_handler_is_silent() {
    let (transport, _, connection) = fixture();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
    connection.on_message("update", move |payload| {
        let _ = update_tx.send(payload);
    });
    connection.on_message("ping", move |payload| {
        let _ = ping_tx.send(payload);
    });
    connection.remove_message_handler("update");

    connection.connect();
    transport
        .push_event(TransportEvent::Message {
            event: "update".to_string(),
            payload: json!(1),
        })
        .await;
    transport
        .push_event(TransportEvent::Message {
            event: "ping".to_string(),
            payload: json!(2),
        })
        .await;

    // The later `ping` arriving proves the earlier `update` was processed
    // and dropped.
    let payload = timeout(Duration::from_secs(1), ping_rx.recv())
        .await
        .expect("ping handler runs")
        .expect("channel open");
    assert_eq!(payload, json!(2));
    assert!(update_rx.try_recv().is_err(), "removed handler must not run");
}

/// Handlers, observers, and per-entity state survive a disconnect and work
/// again after reconnecting.
#[tokio::test]
async fn test_wiring_survives_reconnect_cycle() {
    let (transport, _, connection) = fixture();
    let (tx, mut rx) = mpsc::unbounded_channel();
    connection.on_message("update", move |payload| {
        let _ = tx.send(payload);
    });
    connection.store_data_key(EntityKind::Session, "sess-1", vec![1, 2]);

    connection.connect();
    connection.disconnect();
    assert_eq!(
        connection.data_key(EntityKind::Session, "sess-1"),
        Some(vec![1, 2]),
        "data keys survive disconnect"
    );

    connection.connect();
    transport
        .push_event(TransportEvent::Message {
            event: "update".to_string(),
            payload: json!({"id": 7}),
        })
        .await;

    let payload = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("handler still registered")
        .expect("channel open");
    assert_eq!(payload, json!({"id": 7}));
}

// ── Disconnect and token rotation ─────────────────────────────────────────────

/// Repeated disconnects close the transport once and notify once.
#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    connection.connect();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connecting);
    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);

    connection.disconnect();
    connection.disconnect();
    connection.disconnect();

    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);
    assert!(statuses.try_recv().is_err(), "repeat disconnects must stay silent");
    assert_eq!(transport.close_count(), 1);
}

/// Rotating to a different token recycles the transport and presents the
/// new token at the next handshake; the new handshake is a cold one.
#[tokio::test]
async fn test_token_rotation_recycles_transport() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    let mut reconnects = reconnected_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    connection.connect();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connecting);
    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);
    next_unit(&mut reconnects).await;

    connection.update_token("tok-2");

    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connecting);
    assert_eq!(transport.close_count(), 1);
    assert_eq!(transport.open_count(), 2);
    assert_eq!(transport.last_open().map(|o| o.token), Some("tok-2".to_string()));

    transport.push_event(TransportEvent::Connected { recovered: false }).await;
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);
    next_unit(&mut reconnects).await;
}

/// Rotating to the same token is a complete no-op.
#[tokio::test]
async fn test_same_token_rotation_is_noop() {
    let (transport, _, connection) = fixture();
    let mut statuses = status_channel(&connection);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);

    connection.connect();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connecting);

    connection.update_token("tok-1");

    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.close_count(), 0);
    assert!(statuses.try_recv().is_err(), "same token must not disturb the status");
}

// ── Reconciliation tasks ──────────────────────────────────────────────────────

/// Installed reconcilers run on invalidation and stop at disconnect.
#[tokio::test]
async fn test_session_reconciler_runs_and_stops_with_connection() {
    let (_, _, connection) = fixture();
    connection.connect();

    let (ran_tx, mut ran_rx) = mpsc::unbounded_channel();
    connection.set_session_reconciler(
        "sess-1",
        ReconcileTask::spawn(move || {
            let ran_tx = ran_tx.clone();
            async move {
                let _ = ran_tx.send(());
            }
        }),
    );

    connection.invalidate_session("sess-1");
    timeout(Duration::from_secs(1), ran_rx.recv())
        .await
        .expect("reconciler runs")
        .expect("channel open");

    connection.disconnect();

    // The worker was aborted, so its channel closes without another run.
    assert_eq!(
        timeout(Duration::from_secs(1), ran_rx.recv())
            .await
            .expect("worker exits"),
        None
    );
}

/// Replacing a session's reconciler stops the old one.
#[tokio::test]
async fn test_replacing_reconciler_stops_previous() {
    let (_, _, connection) = fixture();
    connection.connect();

    let (old_tx, mut old_rx) = mpsc::unbounded_channel();
    connection.set_session_reconciler(
        "sess-1",
        ReconcileTask::spawn(move || {
            let old_tx = old_tx.clone();
            async move {
                let _ = old_tx.send("old");
            }
        }),
    );
    let (new_tx, mut new_rx) = mpsc::unbounded_channel();
    connection.set_session_reconciler(
        "sess-1",
        ReconcileTask::spawn(move || {
            let new_tx = new_tx.clone();
            async move {
                let _ = new_tx.send("new");
            }
        }),
    );

    connection.invalidate_session("sess-1");

    assert_eq!(
        timeout(Duration::from_secs(1), new_rx.recv())
            .await
            .expect("new reconciler runs"),
        Some("new")
    );
    // The old worker is gone; its channel closes without a run.
    assert_eq!(
        timeout(Duration::from_secs(1), old_rx.recv())
            .await
            .expect("old worker exits"),
        None
    );
    connection.disconnect();
}

/// Invalidating a session without a reconciler is harmless.
#[tokio::test]
async fn test_invalidate_unknown_session_is_harmless() {
    let (_, _, connection) = fixture();
    connection.invalidate_session("sess-ghost");
}

// ── HTTP passthrough ──────────────────────────────────────────────────────────

/// A token that cannot form a header value fails before any request is
/// attempted.
#[tokio::test]
async fn test_request_with_unusable_token_fails_fast() {
    tracing_init();
    let transport = MockTransport::new();
    let encryption = MockEncryption::new(vec![1]);
    let connection = ServerConnection::new(
        "https://api.happy.engineering",
        AuthCredentials {
            token: "bad\ntoken".to_string(),
            secret: "sec".to_string(),
        },
        encryption,
        transport,
    );

    let result = connection.request("/v1/account", HttpOptions::get()).await;

    assert!(matches!(result, Err(HttpError::InvalidToken)));
}

/// The passthrough works without an open transport: the request is
/// attempted (and here fails at the socket, since nothing listens).
#[tokio::test]
async fn test_request_does_not_require_transport() {
    tracing_init();
    let transport = MockTransport::new();
    let encryption = MockEncryption::new(vec![1]);
    let connection = ServerConnection::new(
        // Discard port; connection attempts fail immediately.
        "http://127.0.0.1:9",
        credentials(),
        encryption,
        transport.clone(),
    );

    let result = connection.request("/v1/account", HttpOptions::get()).await;

    assert!(matches!(result, Err(HttpError::Request(_))));
    assert_eq!(transport.open_count(), 0, "HTTP must not touch the transport");
}
