//! Chatgate Runtime
//!
//! Session lifecycle engine for the chatgate gateway. A [`SessionRegistry`]
//! owns any number of independent sessions; each session runs its own state
//! machine task that consumes transport events and operator commands through
//! a single serialization point, so different sessions proceed fully in
//! parallel while one session's state never races with itself.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chatgate_core::{GateConfig, UnavailableTransport};
//! use chatgate_runtime::SessionRegistry;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SessionRegistry::new(Arc::new(UnavailableTransport), GateConfig::default())?;
//! let outcome = registry.start_session(None)?;
//! let pairing = registry.await_pairing(&outcome.id, None).await?;
//! println!("session {} pairing: {:?}", outcome.id, pairing);
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod qr_wait;
pub mod registry;
pub mod session;
pub mod supervisor;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use qr_wait::PairingOutcome;
pub use registry::{SessionRegistry, StartOutcome};
pub use session::{SessionHandle, SessionSnapshot};
pub use supervisor::ReconnectSupervisor;
