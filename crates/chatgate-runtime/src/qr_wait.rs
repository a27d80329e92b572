//! QR pairing wait protocol
//!
//! Lets a caller suspend until a pairing payload (or authenticated status)
//! becomes available, bounded by a timeout. The wait is cooperative: it
//! awaits snapshot changes on the session's watch channel, re-checking at
//! most once per poll interval, and resolves immediately with `NotFound`
//! when the session is destroyed mid-wait. Expiry is an expected outcome
//! (`StillGenerating`), not an error.

use core::time::Duration;

use chatgate_core::{GateError, GateResult, PairingPayload, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::session::SessionSnapshot;

// ----------------------------------------------------------------------------
// Pairing Outcome
// ----------------------------------------------------------------------------

/// Result of awaiting a session's pairing payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum PairingOutcome {
    /// The current QR challenge, ready to render out-of-band
    Payload { payload: PairingPayload },
    /// The session is already authenticated; no pairing needed
    AlreadyAuthenticated,
    /// No payload appeared within the timeout; try again later
    StillGenerating,
}

// ----------------------------------------------------------------------------
// Wait Implementation
// ----------------------------------------------------------------------------

/// Await a pairing payload on the given session snapshot channel.
///
/// Returns immediately when the session is already authenticated or a
/// payload is present; otherwise waits for snapshot changes up to `timeout`.
/// A session destroyed mid-wait resolves to `NotFound` naming that session.
pub(crate) async fn await_pairing(
    id: &SessionId,
    mut snapshots: watch::Receiver<SessionSnapshot>,
    timeout: Duration,
    poll_interval: Duration,
) -> GateResult<PairingOutcome> {
    let deadline = Instant::now() + timeout;

    loop {
        let snapshot = snapshots.borrow_and_update().clone();

        if snapshot.state.is_terminal() {
            return Err(GateError::not_found(id));
        }
        if snapshot.state.is_authenticated() {
            return Ok(PairingOutcome::AlreadyAuthenticated);
        }
        if let Some(payload) = snapshot.pairing {
            return Ok(PairingOutcome::Payload { payload });
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(PairingOutcome::StillGenerating);
        }

        // Wake on the next snapshot change, re-checking at least once per
        // poll interval so the deadline is always honored.
        match tokio::time::timeout(remaining.min(poll_interval), snapshots.changed()).await {
            Ok(Ok(())) => continue,
            // Sender dropped: the session task exited.
            Ok(Err(_)) => return Err(GateError::not_found(id)),
            // Poll tick elapsed without a change.
            Err(_) => continue,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
