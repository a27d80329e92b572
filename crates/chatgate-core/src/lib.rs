//! Chatgate Core
//!
//! Foundational types for the chatgate session gateway: session identifiers
//! and states, the bounded inbound message ring, the error taxonomy, runtime
//! configuration, and the `TransportClient` collaborator interface that the
//! runtime drives. The actual wire protocol to the messaging network lives
//! behind that interface and is out of scope for this crate.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod ring;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ChannelConfig, GateConfig, ReconnectPolicy};
pub use errors::{GateError, GateResult, Result, TransportError};
pub use ring::MessageRing;
pub use transport::{
    ScriptedSession, ScriptedTransport, TransportCapabilities, TransportClient,
    TransportConnection, TransportEvent, TransportLink, UnavailableTransport,
};
pub use types::{
    Identity, InboundMessage, MessageId, OutboundContent, PairingPayload, SendReceipt, SessionId,
    SessionState, SessionStatus, SessionSummary, SystemInfo, Timestamp,
};
