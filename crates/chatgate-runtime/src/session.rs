//! Per-session state machine
//!
//! Every session runs as its own tokio task owning all mutable session
//! state. Transport events, operator commands and timer callbacks all enter
//! through one `select!` loop, which gives the single-writer discipline the
//! lifecycle needs without any lock shared across sessions. The task
//! publishes a [`SessionSnapshot`] through a watch channel after every
//! transition, so status reads and the QR wait never contend with the loop.
//!
//! The two operations with real transport latency, outbound send and link
//! teardown, are dispatched on spawned tasks; the state machine loop never
//! awaits the external transport.

use std::sync::Arc;

use chatgate_core::{
    GateConfig, GateError, GateResult, Identity, InboundMessage, MessageRing, OutboundContent,
    PairingPayload, SendReceipt, SessionId, SessionState, SessionStatus, SessionSummary,
    TransportClient, TransportEvent, TransportLink,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::supervisor::ReconnectSupervisor;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Operator commands and timer callbacks serialized into the session task
pub(crate) enum SessionCommand {
    Send {
        destination: String,
        content: OutboundContent,
        reply: oneshot::Sender<GateResult<SendReceipt>>,
    },
    Messages {
        reply: oneshot::Sender<Vec<InboundMessage>>,
    },
    Restore {
        reply: oneshot::Sender<GateResult<()>>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
    /// Reconnect timer fired after a recoverable disconnect
    Reinitialize,
    /// Grace timer fired on a simulated session
    SimulatedAdvance,
}

// ----------------------------------------------------------------------------
// Snapshot and Handle
// ----------------------------------------------------------------------------

/// Read-only view of a session, refreshed on every transition
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub pairing: Option<PairingPayload>,
    pub identity: Option<Identity>,
    pub simulated: bool,
    pub message_count: usize,
}

/// Cheap cloneable handle to a running session task
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current snapshot without touching the session task
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch receiver for callers that need to await changes
    pub(crate) fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Status summary for `get-status`
    pub fn status(&self) -> SessionStatus {
        let snapshot = self.snapshot();
        SessionStatus {
            id: self.id.clone(),
            state: snapshot.state,
            authenticated: snapshot.state.is_authenticated(),
            connected: snapshot.state == SessionState::Connected,
            qr_available: snapshot.pairing.is_some(),
            message_count: snapshot.message_count,
            simulated: snapshot.simulated,
            identity: snapshot.identity,
        }
    }

    /// One row for `list-sessions`
    pub fn summary(&self) -> SessionSummary {
        let snapshot = self.snapshot();
        SessionSummary {
            id: self.id.clone(),
            state: snapshot.state,
            simulated: snapshot.simulated,
            message_count: snapshot.message_count,
        }
    }

    /// Send outbound content through the session
    pub async fn send(
        &self,
        destination: &str,
        content: OutboundContent,
    ) -> GateResult<SendReceipt> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Send {
                destination: destination.to_string(),
                content,
                reply,
            })
            .await
            .map_err(|_| GateError::not_found(&self.id))?;
        response.await.map_err(|_| GateError::not_found(&self.id))?
    }

    /// Snapshot of the retained inbound messages
    pub async fn messages(&self) -> GateResult<Vec<InboundMessage>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Messages { reply })
            .await
            .map_err(|_| GateError::not_found(&self.id))?;
        response.await.map_err(|_| GateError::not_found(&self.id))
    }

    /// Force the session back to Initializing, recreating its transport
    pub async fn restore(&self) -> GateResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Restore { reply })
            .await
            .map_err(|_| GateError::not_found(&self.id))?;
        response.await.map_err(|_| GateError::not_found(&self.id))?
    }

    /// Destroy the session; idempotent against an already-exited task
    pub async fn destroy(&self) {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Destroy { reply })
            .await
            .is_ok()
        {
            let _ = response.await;
        }
    }
}

// ----------------------------------------------------------------------------
// Session Task
// ----------------------------------------------------------------------------

/// The per-session state machine task
pub(crate) struct SessionTask {
    id: SessionId,
    config: GateConfig,
    transport: Arc<dyn TransportClient>,

    state: SessionState,
    pairing: Option<PairingPayload>,
    identity: Option<Identity>,
    ring: MessageRing,
    simulated: bool,

    link: Option<Arc<dyn TransportLink>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,

    command_rx: mpsc::Receiver<SessionCommand>,
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot_tx: watch::Sender<SessionSnapshot>,

    supervisor: ReconnectSupervisor,
    grace_timer: Option<JoinHandle<()>>,
    retired_tx: mpsc::UnboundedSender<SessionId>,
}

impl SessionTask {
    /// Spawn the state machine task and return the caller-facing handle
    pub(crate) fn spawn(
        id: SessionId,
        transport: Arc<dyn TransportClient>,
        config: GateConfig,
        retired_tx: mpsc::UnboundedSender<SessionId>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(config.channels.command_buffer_size);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            state: SessionState::Initializing,
            pairing: None,
            identity: None,
            simulated: false,
            message_count: 0,
        });

        let task = SessionTask {
            ring: MessageRing::new(config.ring_capacity),
            supervisor: ReconnectSupervisor::new(config.reconnect.clone()),
            id: id.clone(),
            transport,
            state: SessionState::Initializing,
            pairing: None,
            identity: None,
            simulated: false,
            link: None,
            events: None,
            command_rx,
            command_tx: command_tx.clone(),
            snapshot_tx,
            grace_timer: None,
            retired_tx,
            config,
        };

        tokio::spawn(task.run());

        SessionHandle {
            id,
            commands: command_tx,
            snapshot: snapshot_rx,
        }
    }

    async fn run(mut self) {
        info!(session = %self.id, "session task starting");
        self.initialize().await;

        while !self.state.is_terminal() {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        // All handles gone; the registry entry was dropped.
                        None => self.destroy_session(false).await,
                    }
                }
                event = Self::next_event(&mut self.events) => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            // The transport dropped its event stream without
                            // a close event; treat as a recoverable loss.
                            self.events = None;
                            if !matches!(self.state, SessionState::Disconnected) {
                                self.on_connection_close(
                                    "transport event stream ended".to_string(),
                                    true,
                                ).await;
                            }
                        }
                    }
                }
            }
        }

        self.cancel_timers();
        let _ = self.retired_tx.send(self.id.clone());
        info!(session = %self.id, "session task stopped");
    }

    /// Await the next transport event, pending forever when no stream exists
    /// (simulated and disconnected sessions)
    async fn next_event(
        events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
    ) -> Option<TransportEvent> {
        match events {
            Some(receiver) => receiver.recv().await,
            None => std::future::pending().await,
        }
    }

    // ------------------------------------------------------------------
    // Startup and fallback
    // ------------------------------------------------------------------

    async fn initialize(&mut self) {
        self.set_state(SessionState::Initializing);
        match self.transport.open(&self.id).await {
            Ok(connection) => {
                self.link = Some(connection.link);
                self.events = Some(connection.events);
                debug!(session = %self.id, "transport opened, awaiting pairing challenge");
            }
            Err(GateError::UnsupportedInEnvironment { reason }) => {
                self.enter_simulated(&reason);
            }
            Err(err) => {
                warn!(session = %self.id, %err, "transport startup failed, scheduling retry");
                self.set_state(SessionState::Disconnected);
                self.supervisor.arm(self.command_tx.clone());
            }
        }
    }

    /// Degraded fallback: the environment cannot host a real transport, but
    /// the session still honors the state-machine timing contract with a
    /// synthesized pairing payload and an auto-advance grace timer.
    fn enter_simulated(&mut self, reason: &str) {
        info!(session = %self.id, reason, "no transport available, entering simulated pairing");
        self.simulated = true;
        self.pairing = Some(PairingPayload::synthesize());
        self.set_state(SessionState::AwaitingPairing);
        self.arm_grace_timer();
    }

    fn arm_grace_timer(&mut self) {
        if let Some(handle) = self.grace_timer.take() {
            handle.abort();
        }
        let commands = self.command_tx.clone();
        let grace = self.config.simulated_grace;
        self.grace_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = commands.send(SessionCommand::SimulatedAdvance).await;
        }));
    }

    // ------------------------------------------------------------------
    // Command handling
    // ------------------------------------------------------------------

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Send {
                destination,
                content,
                reply,
            } => self.begin_send(destination, content, reply),
            SessionCommand::Messages { reply } => {
                let _ = reply.send(self.ring.snapshot());
            }
            SessionCommand::Restore { reply } => {
                self.restore_session().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::Destroy { reply } => {
                self.destroy_session(false).await;
                let _ = reply.send(());
            }
            SessionCommand::Reinitialize => {
                if self.state == SessionState::Disconnected {
                    info!(session = %self.id, "reconnecting after disconnect");
                    self.initialize().await;
                }
            }
            SessionCommand::SimulatedAdvance => {
                if self.simulated && self.state == SessionState::AwaitingPairing {
                    self.identity = Some(Identity::new(format!("simulated:{}", self.id)));
                    self.pairing = None;
                    self.set_state(SessionState::Authenticated);
                    self.set_state(SessionState::Connected);
                }
            }
        }
    }

    /// Validate and dispatch an outbound send.
    ///
    /// The transport call runs on its own task and answers the caller's
    /// oneshot directly, so send latency never blocks this loop.
    fn begin_send(
        &mut self,
        destination: String,
        content: OutboundContent,
        reply: oneshot::Sender<GateResult<SendReceipt>>,
    ) {
        if content.is_media() && (self.simulated || !self.transport.capabilities().supports_media) {
            let _ = reply.send(Err(GateError::unsupported(
                "media send unavailable in this environment",
            )));
            return;
        }

        if self.state != SessionState::Connected {
            let _ = reply.send(Err(GateError::not_authenticated(&self.id)));
            return;
        }

        if self.simulated {
            // No transport to involve; acknowledge locally.
            let _ = reply.send(Ok(SendReceipt::synthesized()));
            return;
        }

        match &self.link {
            Some(link) => {
                let link = link.clone();
                tokio::spawn(async move {
                    let _ = reply.send(link.send(&destination, content).await);
                });
            }
            None => {
                let _ = reply.send(Err(GateError::not_authenticated(&self.id)));
            }
        }
    }

    /// Tear down and recreate the transport, keeping the session id.
    /// Pairing state and the message ring are reset.
    async fn restore_session(&mut self) {
        info!(session = %self.id, "restoring session");
        self.cancel_timers();
        self.teardown_link();
        self.events = None;
        self.pairing = None;
        self.identity = None;
        self.simulated = false;
        self.ring.clear();
        self.supervisor.reset();
        self.initialize().await;
    }

    /// Tear down everything this session owns and enter the terminal state.
    /// Credential material is cleared only on a terminal remote logout.
    async fn destroy_session(&mut self, clear_credentials: bool) {
        self.cancel_timers();
        self.teardown_link();
        self.events = None;
        if clear_credentials {
            if let Err(err) = self.transport.clear_credentials(&self.id).await {
                warn!(session = %self.id, %err, "failed to clear credential material");
            }
        }
        self.pairing = None;
        self.identity = None;
        self.ring.clear();
        self.set_state(SessionState::Destroyed);
    }

    /// Best-effort graceful close on a spawned task; failure is logged and
    /// never blocks the session
    fn teardown_link(&mut self) {
        if let Some(link) = self.link.take() {
            let id = self.id.clone();
            tokio::spawn(async move {
                if let Err(err) = link.close().await {
                    warn!(session = %id, %err, "transport teardown failed");
                }
            });
        }
    }

    fn cancel_timers(&mut self) {
        self.supervisor.cancel();
        if let Some(handle) = self.grace_timer.take() {
            handle.abort();
        }
    }

    // ------------------------------------------------------------------
    // Transport event handling
    // ------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PairingChallenge { payload } => match self.state {
                SessionState::Initializing | SessionState::AwaitingPairing => {
                    self.pairing = Some(payload);
                    self.set_state(SessionState::AwaitingPairing);
                }
                state => {
                    debug!(session = %self.id, %state, "ignoring pairing challenge");
                }
            },
            TransportEvent::Authenticated { identity } => match self.state {
                SessionState::Initializing | SessionState::AwaitingPairing => {
                    // The payload is cleared in the same transition that
                    // stores the identity.
                    self.pairing = None;
                    self.identity = Some(identity);
                    self.set_state(SessionState::Authenticated);
                }
                state => {
                    debug!(session = %self.id, %state, "ignoring authenticated event");
                }
            },
            TransportEvent::ConnectionOpen => {
                if self.state == SessionState::Authenticated {
                    self.supervisor.note_connected();
                    self.set_state(SessionState::Connected);
                }
            }
            TransportEvent::ConnectionClose {
                reason,
                recoverable,
            } => {
                self.on_connection_close(reason, recoverable).await;
            }
            TransportEvent::MessageReceived { message } => {
                if self.state.accepts_inbound() {
                    self.ring.append(message);
                    self.publish();
                } else {
                    debug!(
                        session = %self.id,
                        state = %self.state,
                        "dropping inbound message outside connected state"
                    );
                }
            }
        }
    }

    async fn on_connection_close(&mut self, reason: String, recoverable: bool) {
        if self.state.is_terminal() {
            return;
        }
        self.events = None;
        self.link = None;
        self.pairing = None;

        if recoverable {
            warn!(session = %self.id, reason, "connection closed, reconnect scheduled");
            self.set_state(SessionState::Disconnected);
            self.supervisor.arm(self.command_tx.clone());
        } else {
            info!(session = %self.id, reason, "terminal disconnect, destroying session");
            self.set_state(SessionState::Disconnected);
            self.destroy_session(true).await;
        }
    }

    // ------------------------------------------------------------------
    // Snapshot publication
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(session = %self.id, from = %self.state, to = %state, "state transition");
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            state: self.state,
            pairing: self.pairing.clone(),
            identity: self.identity.clone(),
            simulated: self.simulated,
            message_count: self.ring.len(),
        });
    }
}
