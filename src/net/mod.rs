//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Master: ListenAddress → listener.rs (bind once)
//!     → fd inherited by each worker process (or cloned for in-process workers)
//! Worker: inherited fd → GatewayListener → axum::serve
//! ```

pub mod listener;

pub use listener::{GatewayListener, ListenerError, SharedListener};
