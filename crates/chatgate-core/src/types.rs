//! Core types for the chatgate session gateway
//!
//! Newtype wrappers for the identifiers that cross the command surface, plus
//! the message and status structs returned to callers.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Session Identifier
// ----------------------------------------------------------------------------

/// Opaque session identifier, unique within a registry.
///
/// Callers may supply their own id; otherwise [`SessionId::generate`] builds
/// one from the current timestamp plus a random fragment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a caller-supplied id
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id (millisecond timestamp + random fragment)
    pub fn generate() -> Self {
        let fragment = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("session-{}-{}", Timestamp::now().as_millis(), &fragment[..8]))
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Transport startup in progress; no pairing challenge yet
    Initializing,
    /// A pairing payload is (or is about to be) available for scanning
    AwaitingPairing,
    /// Pairing accepted by the network; connection not yet open
    Authenticated,
    /// Fully connected; inbound and outbound traffic flows
    Connected,
    /// Connection lost; a reconnect may be pending
    Disconnected,
    /// Torn down; the id no longer resolves
    Destroyed,
}

impl SessionState {
    /// True once the pairing handshake has completed
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Connected)
    }

    /// True in the states that accept inbound messages
    pub fn accepts_inbound(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Connected)
    }

    /// True once the session can never leave this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Destroyed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initializing => "initializing",
            SessionState::AwaitingPairing => "awaiting-pairing",
            SessionState::Authenticated => "authenticated",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Identity and Pairing
// ----------------------------------------------------------------------------

/// Transport-assigned user identity, present once a session authenticates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque QR pairing challenge token.
///
/// Rendering the token as a scannable image is the host's concern; the
/// runtime only stores and hands out the raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingPayload(String);

impl PairingPayload {
    pub fn new<S: Into<String>>(payload: S) -> Self {
        Self(payload.into())
    }

    /// Synthesize a local payload for a simulated session
    pub fn synthesize() -> Self {
        Self(format!("simulated-pairing-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from raw milliseconds
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current wall-clock timestamp
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Duration elapsed since another timestamp (saturating)
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

/// Identifier assigned to a message by the transport (or synthesized locally
/// for simulated sends)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Generate a local message id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message received from the network, as retained in the session's ring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub from: Identity,
    pub body: String,
    pub timestamp: Timestamp,
}

/// Outbound content handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundContent {
    Text {
        body: String,
    },
    Media {
        payload: Vec<u8>,
        mime_type: String,
        caption: Option<String>,
        filename: Option<String>,
    },
}

impl OutboundContent {
    /// Plain text content
    pub fn text<S: Into<String>>(body: S) -> Self {
        OutboundContent::Text { body: body.into() }
    }

    /// True for media payloads, which need extra transport capability
    pub fn is_media(&self) -> bool {
        matches!(self, OutboundContent::Media { .. })
    }
}

/// Acknowledgment returned for an accepted outbound send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub timestamp: Timestamp,
}

impl SendReceipt {
    /// Synthesize a receipt for a send that never touched a transport
    pub fn synthesized() -> Self {
        Self {
            message_id: MessageId::generate(),
            timestamp: Timestamp::now(),
        }
    }
}

// ----------------------------------------------------------------------------
// Status Reporting
// ----------------------------------------------------------------------------

/// One row of the `list-sessions` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub state: SessionState,
    pub simulated: bool,
    pub message_count: usize,
}

/// Full status of a single session, as returned by `get-status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub id: SessionId,
    pub state: SessionState,
    pub authenticated: bool,
    pub connected: bool,
    pub qr_available: bool,
    pub message_count: usize,
    pub simulated: bool,
    pub identity: Option<Identity>,
}

/// Environment capability summary plus session counts (`system-info`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub transport_available: bool,
    pub media_supported: bool,
    pub transport_type: String,
    pub session_count: usize,
    pub simulated_count: usize,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
