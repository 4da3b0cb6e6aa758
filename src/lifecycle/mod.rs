//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Resolve bundle → Fork fleet → Wait ready → Admin API
//!
//! Signals (signals.rs):
//!     SIGHUP → Reload broadcast
//!     SIGTERM/SIGINT → Shutdown broadcast → wait for workers
//!
//! Shutdown (shutdown.rs):
//!     Fleet stopped → auxiliary tasks finish → exit
//! ```
//!
//! # Design Decisions
//! - The listener is bound before any fork, so every worker shares it
//! - Startup either returns a ready fleet or tears down what it forked

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{AppServer, AppSource, RunningServer, StartError};
