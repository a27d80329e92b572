//! Reconnect supervision
//!
//! After a recoverable disconnect the session task arms exactly one
//! re-initialization timer; a new disconnect re-arms it, replacing any timer
//! still pending, so retries never chain recursively. The default policy is
//! a single fixed delay per disconnect; bounded exponential backoff with
//! jitter is selectable through [`ReconnectPolicy`].

use core::time::Duration;

use chatgate_core::ReconnectPolicy;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::SessionCommand;

// ----------------------------------------------------------------------------
// Reconnect Supervisor
// ----------------------------------------------------------------------------

/// Schedules one re-initialization attempt per disconnect event
pub struct ReconnectSupervisor {
    policy: ReconnectPolicy,
    attempt: u32,
    pending: Option<JoinHandle<()>>,
}

impl ReconnectSupervisor {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            pending: None,
        }
    }

    /// Arm the reconnect timer, replacing any timer still pending.
    ///
    /// When it fires, the timer re-enters the session task through its
    /// command channel rather than touching session state directly.
    pub(crate) fn arm(&mut self, commands: mpsc::Sender<SessionCommand>) {
        self.cancel();
        let delay = self.next_delay();
        self.attempt = self.attempt.saturating_add(1);
        debug!(attempt = self.attempt, ?delay, "reconnect armed");
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(SessionCommand::Reinitialize).await;
        }));
    }

    /// Abort any pending reconnect timer
    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// A connection opened; the next disconnect starts a fresh backoff run
    pub(crate) fn note_connected(&mut self) {
        self.attempt = 0;
    }

    /// Cancel and forget all retry history (restore/destroy)
    pub(crate) fn reset(&mut self) {
        self.cancel();
        self.attempt = 0;
    }

    /// Retry attempts since the last successful connection
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn next_delay(&self) -> Duration {
        let base = self.policy.base_delay_for(self.attempt);
        let jitter = self.policy.jitter();
        if jitter <= 0.0 {
            return base;
        }
        base + base.mul_f64(jitter * rand::random::<f64>())
    }
}

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn fixed(ms: u64) -> ReconnectPolicy {
        ReconnectPolicy::FixedDelay {
            delay: Duration::from_millis(ms),
        }
    }

    #[tokio::test]
    async fn test_arm_delivers_reinitialize() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut supervisor = ReconnectSupervisor::new(fixed(10));
        supervisor.arm(tx);

        let command = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timer should fire")
            .expect("channel open");
        assert!(matches!(command, SessionCommand::Reinitialize));
        assert_eq!(supervisor.attempt(), 1);
    }

    #[tokio::test]
    async fn test_rearm_replaces_pending_timer() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut supervisor = ReconnectSupervisor::new(fixed(30));
        supervisor.arm(tx.clone());
        supervisor.arm(tx);

        // Only the second timer survives; exactly one command arrives.
        let first = timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(first.is_ok());
        let second = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err(), "replaced timer must not fire");
        assert_eq!(supervisor.attempt(), 2);
    }

    #[tokio::test]
    async fn test_cancel_prevents_delivery() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut supervisor = ReconnectSupervisor::new(fixed(20));
        supervisor.arm(tx);
        supervisor.cancel();

        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test]
    async fn test_note_connected_resets_attempts() {
        let (tx, _rx) = mpsc::channel(4);
        let mut supervisor = ReconnectSupervisor::new(ReconnectPolicy::ExponentialBackoff {
            base: Duration::from_millis(1),
            max: Duration::from_millis(8),
            jitter: 0.0,
        });
        supervisor.arm(tx.clone());
        supervisor.arm(tx);
        assert_eq!(supervisor.attempt(), 2);
        supervisor.note_connected();
        assert_eq!(supervisor.attempt(), 0);
        supervisor.reset();
    }
}
