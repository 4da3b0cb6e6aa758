//! Worker subsystem.
//!
//! # Data Flow
//! ```text
//! master fork
//!     → entry.rs (config + listener from env, control over stdio)
//!     → runtime.rs (gateway + render engine, control loop)
//!         Reload   → re-read the bundle (fallback worker: exit, master reforks)
//!         Error    → fallback.rs records it for the error page
//!         Shutdown → exit
//! ```
//!
//! # Design Decisions
//! - Only `Shutdown` or a closed control channel ends a healthy worker
//! - A bundle that fails to load leaves the worker serving the fallback page
//!   until a `Reload` retires it

pub mod entry;
pub mod env;
pub mod fallback;
pub mod runtime;

pub use env::WorkerEnv;
pub use fallback::BootErrorSlot;
pub use runtime::{Worker, WorkerError, WorkerExit};
