//! Runtime configuration for the chatgate session gateway
//!
//! Every timing contract of the session lifecycle is configurable here so
//! tests can run with millisecond-scale timers while production keeps the
//! documented defaults (QR wait 30 s polled at 1 s, reconnect after 5 s,
//! simulated grace 30 s, ring capacity 100).

use core::time::Duration;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

/// Policy applied by the reconnect supervisor after a recoverable disconnect.
///
/// The default is a single fixed-delay retry per disconnect event, re-armed
/// each time a new disconnect occurs. Bounded exponential backoff with
/// jitter is available as a strengthened alternative; the fixed-delay
/// behavior stays selectable for compatibility testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum ReconnectPolicy {
    FixedDelay {
        delay: Duration,
    },
    ExponentialBackoff {
        base: Duration,
        max: Duration,
        /// Fraction of the computed delay added as random jitter (0.0..=1.0)
        jitter: f64,
    },
}

impl ReconnectPolicy {
    /// Base delay before the given retry attempt (0-based), without jitter.
    ///
    /// Jitter is applied by the supervisor at arm time so this stays
    /// deterministic for tests.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        match self {
            ReconnectPolicy::FixedDelay { delay } => *delay,
            ReconnectPolicy::ExponentialBackoff { base, max, .. } => {
                let factor = 2u32.saturating_pow(attempt.min(16));
                base.saturating_mul(factor).min(*max)
            }
        }
    }

    /// Jitter fraction for this policy (zero for fixed delay)
    pub fn jitter(&self) -> f64 {
        match self {
            ReconnectPolicy::FixedDelay { .. } => 0.0,
            ReconnectPolicy::ExponentialBackoff { jitter, .. } => *jitter,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::FixedDelay {
            delay: Duration::from_secs(5),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the bounded channels between the registry, session tasks
/// and transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub command_buffer_size: usize,
    pub event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 64,
            event_buffer_size: 256,
        }
    }
}

// ----------------------------------------------------------------------------
// Gate Configuration
// ----------------------------------------------------------------------------

/// Top-level configuration for a session registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Retained inbound messages per session (FIFO eviction beyond this)
    pub ring_capacity: usize,
    /// Maximum time `await-pairing` blocks before reporting still-generating
    pub qr_wait_timeout: Duration,
    /// Upper bound between pairing-state re-checks while waiting
    pub qr_poll_interval: Duration,
    /// Delay before a simulated session autonomously authenticates.
    ///
    /// Simulated sessions never see a real transport event; after this grace
    /// period they advance to Authenticated and Connected on their own. This
    /// is the documented degraded-mode contract, not a silent failure.
    pub simulated_grace: Duration,
    /// Reconnect behavior after a recoverable disconnect
    pub reconnect: ReconnectPolicy,
    pub channels: ChannelConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 100,
            qr_wait_timeout: Duration::from_secs(30),
            qr_poll_interval: Duration::from_secs(1),
            simulated_grace: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            channels: ChannelConfig::default(),
        }
    }
}

impl GateConfig {
    /// Configuration with millisecond-scale timers for tests
    pub fn testing() -> Self {
        Self {
            ring_capacity: 100,
            qr_wait_timeout: Duration::from_millis(250),
            qr_poll_interval: Duration::from_millis(10),
            simulated_grace: Duration::from_millis(50),
            reconnect: ReconnectPolicy::FixedDelay {
                delay: Duration::from_millis(25),
            },
            channels: ChannelConfig {
                command_buffer_size: 16,
                event_buffer_size: 32,
            },
        }
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> core::result::Result<(), String> {
        if self.ring_capacity == 0 {
            return Err("ring_capacity must be at least 1".to_string());
        }
        if self.qr_poll_interval.is_zero() {
            return Err("qr_poll_interval must be non-zero".to_string());
        }
        if self.qr_poll_interval > self.qr_wait_timeout {
            return Err("qr_poll_interval must not exceed qr_wait_timeout".to_string());
        }
        if self.channels.command_buffer_size == 0 || self.channels.event_buffer_size == 0 {
            return Err("channel buffer sizes must be non-zero".to_string());
        }
        if let ReconnectPolicy::ExponentialBackoff { base, max, jitter } = &self.reconnect {
            if base.is_zero() || base > max {
                return Err("backoff base must be non-zero and not exceed max".to_string());
            }
            if !(0.0..=1.0).contains(jitter) {
                return Err("backoff jitter must be within 0.0..=1.0".to_string());
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GateConfig::default().validate().is_ok());
        assert!(GateConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_default_timing_contract() {
        let config = GateConfig::default();
        assert_eq!(config.ring_capacity, 100);
        assert_eq!(config.qr_wait_timeout, Duration::from_secs(30));
        assert_eq!(config.qr_poll_interval, Duration::from_secs(1));
        assert_eq!(config.simulated_grace, Duration::from_secs(30));
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::FixedDelay {
                delay: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_validation_rejects_zero_ring() {
        let mut config = GateConfig::default();
        config.ring_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_poll_beyond_timeout() {
        let mut config = GateConfig::default();
        config.qr_poll_interval = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fixed_delay_ignores_attempt() {
        let policy = ReconnectPolicy::FixedDelay {
            delay: Duration::from_secs(5),
        };
        assert_eq!(policy.base_delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.base_delay_for(7), Duration::from_secs(5));
        assert_eq!(policy.jitter(), 0.0);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::ExponentialBackoff {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
            jitter: 0.1,
        };
        assert_eq!(policy.base_delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.base_delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.base_delay_for(30), Duration::from_secs(10));
    }
}
