//! Process supervisor.
//!
//! # Data Flow
//! ```text
//! Supervisor::start
//!     → WorkerLauncher::launch × N (process.rs or task.rs)
//!     → WorkerEvents: online, ready, exited
//!     → all ready: FleetState.initialized = true, SupervisorHandle returned
//!
//! steady state (master.rs loop):
//!     exited → RestartPolicy (policy.rs) → launch replacement
//!     SupervisorHandle::broadcast → every live WorkerHandle
//! ```
//!
//! # Design Decisions
//! - Exits before initialization are fatal and never retried
//! - Exits after initialization are reforked immediately by default
//! - Only the supervisor loop mutates `FleetState`; handles see snapshots

pub mod fleet;
pub mod launcher;
pub mod master;
pub mod policy;
pub mod process;
pub mod task;

pub use fleet::{FleetPhase, FleetSnapshot, WorkerId, WorkerState};
pub use launcher::{ExitReason, LaunchError, WorkerEvents, WorkerHandle, WorkerLauncher};
pub use master::{Supervisor, SupervisorError, SupervisorHandle};
pub use policy::{AlwaysRestart, BackoffRestart, RestartPolicy};
pub use process::ProcessLauncher;
pub use task::{TaskLauncher, WorkerFactory};
