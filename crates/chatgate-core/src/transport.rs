//! Transport collaborator interface
//!
//! The runtime never speaks the messaging wire protocol itself. A
//! [`TransportClient`] opens one connection per session and reports lifecycle
//! progress through a [`TransportEvent`] stream; the returned
//! [`TransportLink`] accepts outbound sends and graceful teardown. Credential
//! persistence lives entirely behind this interface.
//!
//! Two stock implementations ship here: [`UnavailableTransport`], which
//! refuses to open and drives the simulated-session fallback, and
//! [`ScriptedTransport`], a scriptable double used by the runtime tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::{GateError, GateResult, TransportError};
use crate::types::{
    Identity, InboundMessage, OutboundContent, PairingPayload, SendReceipt, SessionId,
};

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Lifecycle events emitted by an open transport connection
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A QR pairing challenge was issued (or refreshed)
    PairingChallenge { payload: PairingPayload },
    /// The pairing handshake completed
    Authenticated { identity: Identity },
    /// The connection to the network is open for traffic
    ConnectionOpen,
    /// The connection closed; `recoverable` distinguishes a network blip
    /// from a terminal remote logout
    ConnectionClose { reason: String, recoverable: bool },
    /// An inbound message arrived
    MessageReceived { message: InboundMessage },
}

// ----------------------------------------------------------------------------
// Transport Capabilities
// ----------------------------------------------------------------------------

/// What the hosting environment's transport can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCapabilities {
    /// Whether a real connection can be established at all
    pub available: bool,
    /// Whether media sends are supported
    pub supports_media: bool,
    /// Identifier for status reporting
    pub transport_type: &'static str,
}

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// An open per-session connection: the send/teardown half plus the inbound
/// event stream consumed by the session's state machine loop
pub struct TransportConnection {
    pub link: Arc<dyn TransportLink>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl std::fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnection")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Factory for per-session transport connections
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Open a connection for the given session.
    ///
    /// `GateError::UnsupportedInEnvironment` signals that no transport can
    /// exist here; the session falls back to its simulated variant. Any
    /// other failure is treated as recoverable.
    async fn open(&self, session: &SessionId) -> GateResult<TransportConnection>;

    /// Remove persisted credential material for the session, if any
    async fn clear_credentials(&self, session: &SessionId) -> GateResult<()>;

    fn capabilities(&self) -> TransportCapabilities;
}

/// The outbound half of an open connection
#[async_trait]
pub trait TransportLink: Send + Sync {
    /// Send content to a destination, returning the transport-assigned
    /// message id and timestamp
    async fn send(&self, destination: &str, content: OutboundContent) -> GateResult<SendReceipt>;

    /// Graceful teardown; best-effort, callers tolerate failure
    async fn close(&self) -> GateResult<()>;
}

// ----------------------------------------------------------------------------
// Unavailable Transport
// ----------------------------------------------------------------------------

/// Transport for environments where no real connection can be established.
///
/// Every `open` fails with `UnsupportedInEnvironment`, so every session run
/// against it takes the simulated fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTransport;

#[async_trait]
impl TransportClient for UnavailableTransport {
    async fn open(&self, _session: &SessionId) -> GateResult<TransportConnection> {
        Err(GateError::unsupported(
            "no messaging transport in this environment",
        ))
    }

    async fn clear_credentials(&self, _session: &SessionId) -> GateResult<()> {
        Ok(())
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            available: false,
            supports_media: false,
            transport_type: "unavailable",
        }
    }
}

// ----------------------------------------------------------------------------
// Scripted Transport (test double)
// ----------------------------------------------------------------------------

/// Shared controls for a [`ScriptedTransport`]
#[derive(Debug, Default)]
struct ScriptedControls {
    fail_opens: AtomicBool,
    fail_sends: AtomicBool,
}

/// Scriptable transport double.
///
/// Each successful `open` hands the test a [`ScriptedSession`] through the
/// receiver returned by [`ScriptedTransport::new`]; the test injects
/// lifecycle events and inspects outbound sends through it. Serves the same
/// role the stub transport tasks in the simulator harness do for the
/// runtime's integration tests.
pub struct ScriptedTransport {
    supports_media: bool,
    controls: Arc<ScriptedControls>,
    opened_tx: mpsc::UnboundedSender<ScriptedSession>,
    credentials_cleared: Arc<Mutex<Vec<SessionId>>>,
}

/// Test-side handle to one opened scripted connection
pub struct ScriptedSession {
    pub session: SessionId,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: Arc<Mutex<Vec<(String, OutboundContent)>>>,
    closed: Arc<AtomicBool>,
}

struct ScriptedLink {
    controls: Arc<ScriptedControls>,
    outbound: Arc<Mutex<Vec<(String, OutboundContent)>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedTransport {
    /// Create a transport plus the stream of sessions it opens
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScriptedSession>) {
        Self::with_media(true)
    }

    /// Create a transport with explicit media capability
    pub fn with_media(supports_media: bool) -> (Self, mpsc::UnboundedReceiver<ScriptedSession>) {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        (
            Self {
                supports_media,
                controls: Arc::new(ScriptedControls::default()),
                opened_tx,
                credentials_cleared: Arc::new(Mutex::new(Vec::new())),
            },
            opened_rx,
        )
    }

    /// Make subsequent opens fail with a recoverable transport error
    pub fn set_fail_opens(&self, fail: bool) {
        self.controls.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent sends fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.controls.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Sessions whose credentials were cleared (terminal logouts)
    pub fn credentials_cleared(&self) -> Vec<SessionId> {
        self.credentials_cleared.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl TransportClient for ScriptedTransport {
    async fn open(&self, session: &SessionId) -> GateResult<TransportConnection> {
        if self.controls.fail_opens.load(Ordering::SeqCst) {
            return Err(TransportError::OpenFailed {
                session: session.to_string(),
                reason: "scripted open failure".into(),
            }
            .into());
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let outbound = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let link = Arc::new(ScriptedLink {
            controls: self.controls.clone(),
            outbound: outbound.clone(),
            closed: closed.clone(),
        });

        // The receiver side may have been dropped by tests that only care
        // about the session task's behavior.
        let _ = self.opened_tx.send(ScriptedSession {
            session: session.clone(),
            events: events_tx,
            outbound,
            closed,
        });

        Ok(TransportConnection {
            link,
            events: events_rx,
        })
    }

    async fn clear_credentials(&self, session: &SessionId) -> GateResult<()> {
        self.credentials_cleared
            .lock()
            .expect("lock poisoned")
            .push(session.clone());
        Ok(())
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            available: true,
            supports_media: self.supports_media,
            transport_type: "scripted",
        }
    }
}

impl ScriptedSession {
    /// Inject a raw transport event
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn emit_pairing(&self, payload: &str) {
        self.emit(TransportEvent::PairingChallenge {
            payload: PairingPayload::new(payload),
        });
    }

    pub fn emit_authenticated(&self, identity: &str) {
        self.emit(TransportEvent::Authenticated {
            identity: Identity::new(identity),
        });
    }

    pub fn emit_open(&self) {
        self.emit(TransportEvent::ConnectionOpen);
    }

    pub fn emit_close(&self, reason: &str, recoverable: bool) {
        self.emit(TransportEvent::ConnectionClose {
            reason: reason.to_string(),
            recoverable,
        });
    }

    pub fn emit_message(&self, message: InboundMessage) {
        self.emit(TransportEvent::MessageReceived { message });
    }

    /// Outbound sends recorded so far
    pub fn sent(&self) -> Vec<(String, OutboundContent)> {
        self.outbound.lock().expect("lock poisoned").clone()
    }

    /// Whether the runtime closed the link
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportLink for ScriptedLink {
    async fn send(&self, destination: &str, content: OutboundContent) -> GateResult<SendReceipt> {
        if self.controls.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed {
                reason: "scripted send failure".into(),
            }
            .into());
        }
        self.outbound
            .lock()
            .expect("lock poisoned")
            .push((destination.to_string(), content));
        Ok(SendReceipt::synthesized())
    }

    async fn close(&self) -> GateResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
