//! Session registry
//!
//! Concurrent map of session-id to running session task. Creation uses the
//! map's entry API so a racing double-create for the same id loses with
//! `AlreadyExists` instead of silently replacing the existing session. No
//! operation locks the registry as a whole; commands contend only on the
//! target session's own channel.
//!
//! A janitor task reaps map entries for sessions whose tasks exited on their
//! own (terminal remote logout), so a destroyed id stops resolving without
//! any caller involvement.

use core::time::Duration;
use std::sync::Arc;

use chatgate_core::{
    GateConfig, GateError, GateResult, InboundMessage, OutboundContent, SendReceipt, SessionId,
    SessionStatus, SessionSummary, SystemInfo, TransportClient,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::qr_wait::{self, PairingOutcome};
use crate::session::{SessionHandle, SessionTask};

// ----------------------------------------------------------------------------
// Start Outcome
// ----------------------------------------------------------------------------

/// Result of `start-session`: the resolved id plus whether it was created
/// now or already existed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub id: SessionId,
    pub created: bool,
}

// ----------------------------------------------------------------------------
// Session Registry
// ----------------------------------------------------------------------------

/// Owns every session behind the command surface.
///
/// Registries are plain injected values, not process-wide singletons; tests
/// construct as many isolated instances as they need.
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
    transport: Arc<dyn TransportClient>,
    config: GateConfig,
    retired_tx: mpsc::UnboundedSender<SessionId>,
    janitor: JoinHandle<()>,
}

impl SessionRegistry {
    /// Create a registry over the given transport collaborator
    pub fn new(transport: Arc<dyn TransportClient>, config: GateConfig) -> GateResult<Self> {
        config.validate().map_err(GateError::config_error)?;

        let sessions: Arc<DashMap<SessionId, SessionHandle>> = Arc::new(DashMap::new());
        let (retired_tx, mut retired_rx) = mpsc::unbounded_channel::<SessionId>();

        let janitor_sessions = sessions.clone();
        let janitor = tokio::spawn(async move {
            while let Some(id) = retired_rx.recv().await {
                if janitor_sessions.remove(&id).is_some() {
                    debug!(session = %id, "reaped retired session");
                }
            }
        });

        Ok(Self {
            sessions,
            transport,
            config,
            retired_tx,
            janitor,
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Create a new session, generating an id when none is supplied.
    /// Fails with `AlreadyExists` if the id is taken.
    pub fn create(&self, id: Option<SessionId>) -> GateResult<SessionId> {
        let id = id.unwrap_or_else(SessionId::generate);

        match self.sessions.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(GateError::already_exists(&id)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let handle = SessionTask::spawn(
                    id.clone(),
                    self.transport.clone(),
                    self.config.clone(),
                    self.retired_tx.clone(),
                );
                entry.insert(handle);
                info!(session = %id, "session created");
                Ok(id)
            }
        }
    }

    /// `start-session`: create, or report the existing session untouched
    pub fn start_session(&self, id: Option<SessionId>) -> GateResult<StartOutcome> {
        match self.create(id) {
            Ok(id) => Ok(StartOutcome { id, created: true }),
            Err(GateError::AlreadyExists { id }) => Ok(StartOutcome {
                id: SessionId::new(id),
                created: false,
            }),
            Err(err) => Err(err),
        }
    }

    /// Resolve a live session handle
    pub fn get(&self, id: &SessionId) -> GateResult<SessionHandle> {
        let handle = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GateError::not_found(id))?;

        // A terminally-closed session may linger until the janitor runs;
        // its id must not resolve either way.
        if handle.snapshot().state.is_terminal() {
            return Err(GateError::not_found(id));
        }
        Ok(handle)
    }

    /// `destroy-session`: idempotent removal; the map entry disappears
    /// before the destroy command is delivered
    pub async fn destroy(&self, id: &SessionId) -> GateResult<()> {
        let (_, handle) = self
            .sessions
            .remove(id)
            .ok_or_else(|| GateError::not_found(id))?;
        handle.destroy().await;
        info!(session = %id, "session destroyed");
        Ok(())
    }

    /// `restore-session`: force the session back to Initializing with a
    /// fresh transport; the id survives, pairing state and ring do not
    pub async fn restore(&self, id: &SessionId) -> GateResult<()> {
        self.get(id)?.restore().await
    }

    // ------------------------------------------------------------------
    // Query operations
    // ------------------------------------------------------------------

    /// `list-sessions` (order not significant)
    pub fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|entry| entry.value().summary())
            .filter(|summary| !summary.state.is_terminal())
            .collect()
    }

    /// `get-status`
    pub fn status(&self, id: &SessionId) -> GateResult<SessionStatus> {
        Ok(self.get(id)?.status())
    }

    /// `get-messages`: ordered snapshot of the session's ring
    pub async fn messages(&self, id: &SessionId) -> GateResult<Vec<InboundMessage>> {
        self.get(id)?.messages().await
    }

    /// `system-info`
    pub fn system_info(&self) -> SystemInfo {
        let capabilities = self.transport.capabilities();
        let summaries = self.list();
        let simulated_count = summaries.iter().filter(|s| s.simulated).count();
        SystemInfo {
            transport_available: capabilities.available,
            media_supported: capabilities.supports_media,
            transport_type: capabilities.transport_type.to_string(),
            session_count: summaries.len(),
            simulated_count,
        }
    }

    // ------------------------------------------------------------------
    // Messaging operations
    // ------------------------------------------------------------------

    /// `send-text`
    pub async fn send_text(
        &self,
        id: &SessionId,
        destination: &str,
        body: &str,
    ) -> GateResult<SendReceipt> {
        self.get(id)?
            .send(destination, OutboundContent::text(body))
            .await
    }

    /// `send-media`
    pub async fn send_media(
        &self,
        id: &SessionId,
        destination: &str,
        payload: Vec<u8>,
        mime_type: &str,
        caption: Option<String>,
        filename: Option<String>,
    ) -> GateResult<SendReceipt> {
        let content = OutboundContent::Media {
            payload,
            mime_type: mime_type.to_string(),
            caption,
            filename,
        };
        self.get(id)?.send(destination, content).await
    }

    /// `await-pairing`: block (cooperatively) until a payload or
    /// authenticated status is available, up to the timeout
    pub async fn await_pairing(
        &self,
        id: &SessionId,
        timeout: Option<Duration>,
    ) -> GateResult<PairingOutcome> {
        let handle = self.get(id)?;
        qr_wait::await_pairing(
            id,
            handle.watch(),
            timeout.unwrap_or(self.config.qr_wait_timeout),
            self.config.qr_poll_interval,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Destroy every session (host shutdown)
    pub async fn shutdown(&self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            let _ = self.destroy(&id).await;
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.janitor.abort();
    }
}
