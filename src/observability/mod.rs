//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! supervisor, gateway, admin
//!     → logging.rs (structured log events on stderr)
//!     → metrics.rs (counters and gauges, Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request IDs are set by the gateway and flow through its trace spans
//! - Metrics are off unless configured; recording is cheap either way

pub mod logging;
pub mod metrics;
