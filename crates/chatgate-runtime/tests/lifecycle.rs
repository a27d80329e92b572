//! Integration tests for the session lifecycle
//!
//! Drives full registries over scripted transports: pairing handshakes,
//! authentication, connect/disconnect/reconnect, terminal logout, restore,
//! the simulated fallback, and the bounded message ring. All waits are
//! timeout-bounded so a regression hangs a test instead of the suite.

use std::sync::Arc;
use std::time::Duration;

use chatgate_core::{
    GateConfig, GateError, Identity, InboundMessage, MessageId, OutboundContent, ScriptedSession,
    ScriptedTransport, SessionId, SessionState, SessionStatus, Timestamp, UnavailableTransport,
};
use chatgate_runtime::{PairingOutcome, SessionRegistry};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_ok;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(2);

fn scripted_registry() -> (
    SessionRegistry,
    Arc<ScriptedTransport>,
    mpsc::UnboundedReceiver<ScriptedSession>,
) {
    let (transport, opened) = ScriptedTransport::new();
    let transport = Arc::new(transport);
    let registry = SessionRegistry::new(transport.clone(), GateConfig::testing())
        .expect("testing config is valid");
    (registry, transport, opened)
}

fn simulated_registry() -> SessionRegistry {
    SessionRegistry::new(Arc::new(UnavailableTransport), GateConfig::testing())
        .expect("testing config is valid")
}

async fn next_opened(opened: &mut mpsc::UnboundedReceiver<ScriptedSession>) -> ScriptedSession {
    timeout(WAIT, opened.recv())
        .await
        .expect("transport open within deadline")
        .expect("opened channel live")
}

/// Poll session status until the predicate holds
async fn wait_for_status<F>(registry: &SessionRegistry, id: &SessionId, predicate: F) -> SessionStatus
where
    F: Fn(&SessionStatus) -> bool,
{
    timeout(WAIT, async {
        loop {
            if let Ok(status) = registry.status(id) {
                if predicate(&status) {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("status predicate within deadline")
}

fn inbound(n: usize) -> InboundMessage {
    InboundMessage {
        id: MessageId::new(format!("m{}", n)),
        from: Identity::new("peer@example"),
        body: format!("message {}", n),
        timestamp: Timestamp::new(n as u64),
    }
}

// ----------------------------------------------------------------------------
// Pairing and Authentication
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_full_handshake_and_send() {
    let (registry, _transport, mut opened) = scripted_registry();

    let outcome = registry.start_session(Some(SessionId::new("s1"))).unwrap();
    assert!(outcome.created);
    let id = outcome.id;
    let session = next_opened(&mut opened).await;

    // Sending before authentication is refused.
    let err = registry.send_text(&id, "5511999990000", "hi").await.unwrap_err();
    assert!(matches!(err, GateError::NotAuthenticated { .. }));

    // The pairing challenge surfaces through await-pairing.
    session.emit_pairing("qr-token-1");
    let pairing = registry.await_pairing(&id, None).await.unwrap();
    assert_eq!(
        pairing,
        PairingOutcome::Payload {
            payload: chatgate_core::PairingPayload::new("qr-token-1")
        }
    );

    // Authenticate and connect.
    session.emit_authenticated("user@example");
    session.emit_open();
    wait_for_status(&registry, &id, |s| s.connected).await;

    let receipt = assert_ok!(registry.send_text(&id, "5511999990000", "hi").await);
    assert!(!receipt.message_id.as_str().is_empty());

    let sent = session.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "5511999990000");
    assert_eq!(sent[0].1, OutboundContent::text("hi"));
}

#[tokio::test]
async fn test_pairing_payload_cleared_once_authenticated() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let session = next_opened(&mut opened).await;

    session.emit_pairing("qr-token");
    let status = wait_for_status(&registry, &id, |s| s.qr_available).await;
    assert_eq!(status.state, SessionState::AwaitingPairing);

    session.emit_authenticated("user@example");
    let status = wait_for_status(&registry, &id, |s| s.authenticated).await;
    assert!(!status.qr_available, "payload must clear with authentication");
    assert_eq!(status.identity, Some(Identity::new("user@example")));
}

#[tokio::test]
async fn test_await_pairing_on_authenticated_session_returns_immediately() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let session = next_opened(&mut opened).await;

    session.emit_pairing("qr");
    session.emit_authenticated("user@example");
    wait_for_status(&registry, &id, |s| s.authenticated).await;

    let started = tokio::time::Instant::now();
    let outcome = registry.await_pairing(&id, None).await.unwrap();
    assert_eq!(outcome, PairingOutcome::AlreadyAuthenticated);
    // Bounded by a small constant, not the wait timeout.
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_await_pairing_times_out_as_still_generating() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(None).unwrap();
    let _session = next_opened(&mut opened).await;

    // No pairing event ever arrives; expiry is a normal outcome.
    let outcome = registry
        .await_pairing(&id, Some(Duration::from_millis(50)))
        .await
        .unwrap();
    assert_eq!(outcome, PairingOutcome::StillGenerating);
}

#[tokio::test]
async fn test_await_pairing_unknown_session() {
    let registry = simulated_registry();
    let err = registry
        .await_pairing(&SessionId::new("missing"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::NotFound { .. }));
}

// ----------------------------------------------------------------------------
// Registry Semantics
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_create_conflicts_without_mutating() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let session = next_opened(&mut opened).await;

    session.emit_pairing("qr");
    session.emit_authenticated("user@example");
    session.emit_open();
    wait_for_status(&registry, &id, |s| s.connected).await;

    let err = registry.create(Some(SessionId::new("s1"))).unwrap_err();
    assert!(matches!(err, GateError::AlreadyExists { .. }));

    // start-session reports the existing session instead of erroring.
    let outcome = registry.start_session(Some(SessionId::new("s1"))).unwrap();
    assert!(!outcome.created);
    assert_eq!(outcome.id, id);

    // The existing session's state is untouched.
    let status = registry.status(&id).unwrap();
    assert_eq!(status.state, SessionState::Connected);
}

#[tokio::test]
async fn test_generated_ids_and_list() {
    let registry = simulated_registry();
    let a = registry.start_session(None).unwrap();
    let b = registry.start_session(None).unwrap();
    assert!(a.created && b.created);
    assert_ne!(a.id, b.id);

    let summaries = registry.list();
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.simulated));

    let info = registry.system_info();
    assert!(!info.transport_available);
    assert_eq!(info.session_count, 2);
    assert_eq!(info.simulated_count, 2);
}

#[tokio::test]
async fn test_destroy_makes_id_unresolvable() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let _session = next_opened(&mut opened).await;

    registry.destroy(&id).await.unwrap();

    assert!(matches!(registry.status(&id), Err(GateError::NotFound { .. })));
    assert!(matches!(
        registry.messages(&id).await,
        Err(GateError::NotFound { .. })
    ));
    assert!(matches!(
        registry.send_text(&id, "dest", "hi").await,
        Err(GateError::NotFound { .. })
    ));
    assert!(matches!(
        registry.await_pairing(&id, None).await,
        Err(GateError::NotFound { .. })
    ));
    // Idempotent removal: a second destroy reports the id as gone.
    assert!(matches!(
        registry.destroy(&id).await,
        Err(GateError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_destroy_mid_wait_resolves_not_found() {
    let (registry, _transport, mut opened) = scripted_registry();
    let registry = Arc::new(registry);
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let _session = next_opened(&mut opened).await;

    let waiter = {
        let registry = registry.clone();
        let id = id.clone();
        tokio::spawn(async move {
            registry
                .await_pairing(&id, Some(Duration::from_secs(5)))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    registry.destroy(&id).await.unwrap();

    let result = timeout(WAIT, waiter).await.unwrap().unwrap();
    match result {
        Err(GateError::NotFound { id }) => assert_eq!(id, "s1"),
        other => panic!("expected not-found, got {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// Message Ring Behavior
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_ring_retains_last_hundred_messages() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let session = next_opened(&mut opened).await;

    session.emit_pairing("qr");
    session.emit_authenticated("user@example");
    session.emit_open();
    wait_for_status(&registry, &id, |s| s.connected).await;

    for n in 0..101 {
        session.emit_message(inbound(n));
    }
    wait_for_status(&registry, &id, |s| s.message_count == 100).await;

    let messages = registry.messages(&id).await.unwrap();
    assert_eq!(messages.len(), 100);
    assert_eq!(messages[0].body, "message 1");
    assert_eq!(messages[99].body, "message 100");
}

#[tokio::test]
async fn test_inbound_dropped_outside_connected_states() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let session = next_opened(&mut opened).await;

    // Still awaiting pairing: inbound traffic is dropped without error.
    session.emit_pairing("qr");
    session.emit_message(inbound(0));
    wait_for_status(&registry, &id, |s| s.qr_available).await;
    assert_eq!(registry.messages(&id).await.unwrap().len(), 0);

    // Authenticated (not yet connected) accepts inbound.
    session.emit_authenticated("user@example");
    session.emit_message(inbound(1));
    wait_for_status(&registry, &id, |s| s.message_count == 1).await;
}

// ----------------------------------------------------------------------------
// Disconnect and Reconnect
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_recoverable_disconnect_reconnects_and_preserves_history() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let session = next_opened(&mut opened).await;

    session.emit_pairing("qr");
    session.emit_authenticated("user@example");
    session.emit_open();
    wait_for_status(&registry, &id, |s| s.connected).await;
    session.emit_message(inbound(0));
    wait_for_status(&registry, &id, |s| s.message_count == 1).await;

    session.emit_close("stream error", true);
    wait_for_status(&registry, &id, |s| s.state == SessionState::Disconnected).await;

    // The supervisor re-initializes; the transport opens a fresh connection.
    let session2 = next_opened(&mut opened).await;
    wait_for_status(&registry, &id, |s| s.state == SessionState::Initializing).await;

    // Buffered messages survive the implicit re-initialization.
    assert_eq!(registry.messages(&id).await.unwrap().len(), 1);

    // The new connection pairs again as usual.
    session2.emit_pairing("qr-2");
    let outcome = registry.await_pairing(&id, None).await.unwrap();
    assert!(matches!(outcome, PairingOutcome::Payload { .. }));
}

#[tokio::test]
async fn test_terminal_logout_destroys_and_clears_credentials() {
    let (registry, transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let session = next_opened(&mut opened).await;

    session.emit_pairing("qr");
    session.emit_authenticated("user@example");
    session.emit_open();
    wait_for_status(&registry, &id, |s| s.connected).await;

    session.emit_close("remote logout", false);

    // The session reaps itself; its id stops resolving.
    timeout(WAIT, async {
        loop {
            if matches!(registry.status(&id), Err(GateError::NotFound { .. })) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session reaped within deadline");

    assert_eq!(transport.credentials_cleared(), vec![id]);
}

#[tokio::test]
async fn test_failed_open_retries_until_transport_recovers() {
    let (transport, mut opened) = ScriptedTransport::new();
    let transport = Arc::new(transport);
    transport.set_fail_opens(true);
    let registry =
        SessionRegistry::new(transport.clone(), GateConfig::testing()).unwrap();

    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    wait_for_status(&registry, &id, |s| s.state == SessionState::Disconnected).await;

    transport.set_fail_opens(false);
    let session = next_opened(&mut opened).await;
    session.emit_pairing("qr-after-retry");
    let outcome = registry.await_pairing(&id, None).await.unwrap();
    assert!(matches!(outcome, PairingOutcome::Payload { .. }));
}

// ----------------------------------------------------------------------------
// Restore
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_restore_resets_pairing_and_ring_but_keeps_id() {
    let (registry, _transport, mut opened) = scripted_registry();
    let id = registry.create(Some(SessionId::new("s1"))).unwrap();
    let session = next_opened(&mut opened).await;

    session.emit_pairing("qr");
    session.emit_authenticated("user@example");
    session.emit_open();
    wait_for_status(&registry, &id, |s| s.connected).await;
    session.emit_message(inbound(0));
    wait_for_status(&registry, &id, |s| s.message_count == 1).await;

    registry.restore(&id).await.unwrap();

    // A fresh transport connection is opened for the same id.
    let session2 = next_opened(&mut opened).await;
    assert_eq!(session2.session, id);

    let status = registry.status(&id).unwrap();
    assert!(!status.authenticated);
    assert!(!status.qr_available);
    assert_eq!(status.message_count, 0);

    // The restored session runs a normal handshake.
    session2.emit_pairing("qr-restored");
    session2.emit_authenticated("user@example");
    session2.emit_open();
    wait_for_status(&registry, &id, |s| s.connected).await;
}

// ----------------------------------------------------------------------------
// Simulated Fallback
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_simulated_session_follows_the_same_contract() {
    let registry = simulated_registry();
    let id = registry.start_session(None).unwrap().id;

    // A synthesized pairing payload is available well within one poll unit.
    let outcome = registry.await_pairing(&id, None).await.unwrap();
    let payload = match outcome {
        PairingOutcome::Payload { payload } => payload,
        other => panic!("expected payload, got {:?}", other),
    };
    assert!(payload.as_str().starts_with("simulated-pairing-"));

    // Sending before the grace delay elapses is refused like any other
    // unauthenticated session.
    let err = registry.send_text(&id, "dest", "hi").await.unwrap_err();
    assert!(matches!(err, GateError::NotAuthenticated { .. }));

    // Without any transport event the session reaches Connected.
    let status = wait_for_status(&registry, &id, |s| s.connected).await;
    assert!(status.simulated);
    assert!(!status.qr_available);

    // Sends are acknowledged with a synthesized receipt.
    let receipt = registry.send_text(&id, "dest", "hi").await.unwrap();
    assert!(!receipt.message_id.as_str().is_empty());

    // Media needs a real transport.
    let err = registry
        .send_media(&id, "dest", vec![1, 2, 3], "image/png", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::UnsupportedInEnvironment { .. }));
}

#[tokio::test]
async fn test_sessions_proceed_in_parallel() {
    let registry = Arc::new(simulated_registry());

    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(registry.start_session(None).unwrap().id);
    }

    // All sessions authenticate on their own grace timers concurrently.
    for id in &ids {
        wait_for_status(&registry, id, |s| s.connected).await;
    }

    registry.shutdown().await;
    assert!(registry.list().is_empty());
}
