//! Chatgate CLI library
//!
//! Hosts the session gateway behind a command-line surface: a scriptable
//! interactive mode that maps line commands onto registry operations and
//! prints JSON results, plus one-shot environment inspection.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands};
pub use error::{CliError, Result};

// Re-export commonly used types
pub use chatgate_core::{GateConfig, ReconnectPolicy, SessionId, UnavailableTransport};
pub use chatgate_runtime::{PairingOutcome, SessionRegistry};
