//! Error types for the chatgate session gateway
//!
//! All command-level failures surface as a [`GateError`] with a stable
//! machine-readable kind. Transport collaborator failures carry their own
//! [`TransportError`] taxonomy and are translated into state transitions or
//! command results at the session boundary; they never abort the registry or
//! sibling sessions.

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures reported by the transport collaborator
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open transport for session {session}: {reason}")]
    OpenFailed { session: String, reason: String },
    #[error("send failed: {reason}")]
    SendFailed { reason: String },
    #[error("transport teardown failed: {reason}")]
    TeardownFailed { reason: String },
    #[error("transport is not available in this environment")]
    Unavailable,
    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport shut down: {reason}")]
    Shutdown { reason: String },
}

// ----------------------------------------------------------------------------
// Gate Errors
// ----------------------------------------------------------------------------

/// Top-level error taxonomy for registry and session operations
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("session not found: {id}")]
    NotFound { id: String },

    #[error("session already exists: {id}")]
    AlreadyExists { id: String },

    #[error("session {id} is not connected")]
    NotAuthenticated { id: String },

    #[error("unsupported in this environment: {reason}")]
    UnsupportedInEnvironment { reason: String },

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Internal channel to a session task closed unexpectedly
    #[error("channel error: {message}")]
    Channel { message: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl GateError {
    /// Create a session-not-found error
    pub fn not_found<S: std::fmt::Display>(id: S) -> Self {
        GateError::NotFound { id: id.to_string() }
    }

    /// Create a duplicate-session error
    pub fn already_exists<S: std::fmt::Display>(id: S) -> Self {
        GateError::AlreadyExists { id: id.to_string() }
    }

    /// Create a not-authenticated error
    pub fn not_authenticated<S: std::fmt::Display>(id: S) -> Self {
        GateError::NotAuthenticated { id: id.to_string() }
    }

    /// Create an environment-capability error
    pub fn unsupported<S: Into<String>>(reason: S) -> Self {
        GateError::UnsupportedInEnvironment {
            reason: reason.into(),
        }
    }

    /// Create an internal channel error
    pub fn channel_error<S: Into<String>>(message: S) -> Self {
        GateError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error<S: Into<String>>(reason: S) -> Self {
        GateError::Configuration {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind for structured command results
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::NotFound { .. } => "not-found",
            GateError::AlreadyExists { .. } => "already-exists",
            GateError::NotAuthenticated { .. } => "not-authenticated",
            GateError::UnsupportedInEnvironment { .. } => "unsupported-in-environment",
            GateError::Transport(_) => "transport-failure",
            GateError::Timeout { .. } => "timeout",
            GateError::Channel { .. } => "channel",
            GateError::Configuration { .. } => "configuration",
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, GateError>;
pub type GateResult<T> = Result<T>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(GateError::not_found("s1").kind(), "not-found");
        assert_eq!(GateError::already_exists("s1").kind(), "already-exists");
        assert_eq!(GateError::not_authenticated("s1").kind(), "not-authenticated");
        assert_eq!(GateError::unsupported("no media").kind(), "unsupported-in-environment");
        assert_eq!(
            GateError::from(TransportError::Unavailable).kind(),
            "transport-failure"
        );
        assert_eq!(GateError::Timeout { duration_ms: 30_000 }.kind(), "timeout");
    }

    #[test]
    fn test_transport_error_converts() {
        let err: GateError = TransportError::SendFailed {
            reason: "socket closed".into(),
        }
        .into();
        assert!(matches!(err, GateError::Transport(_)));
        assert!(err.to_string().contains("socket closed"));
    }
}
