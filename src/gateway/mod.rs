//! Caching HTTP gateway.
//!
//! # Data Flow
//! ```text
//! request
//!     → lookup.rs probe (GET only; tags CachedBody or CacheMiss)
//!     → compression (optional)
//!     → lookup.rs short-circuit (CachedBody → send, stop)
//!     → auth.rs (optional; 401 + challenge)
//!     → assets.rs (optional; /assets misses are 404, never rendered)
//!     → render_stage.rs (engine or fallback page)
//!         → intercept.rs tee on CacheMiss → CacheStore::put after body end
//! ```
//!
//! # Design Decisions
//! - Cache failures degrade to a full render and never reach the client
//! - The tee copies what the render stage produced, before compression

pub mod assets;
pub mod auth;
pub mod intercept;
pub mod lookup;
pub mod render_stage;
pub mod server;

pub use render_stage::RenderStage;
pub use server::{GatewayOptions, GatewayServer};
