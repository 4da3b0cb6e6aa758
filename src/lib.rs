//! Server-side rendering app server.
//!
//! A master process forks a fleet of workers that share one listening
//! socket. Each worker runs a caching HTTP gateway in front of a render
//! engine; the master keeps the fleet at size and relays control messages.

pub mod admin;
pub mod cache;
pub mod config;
pub mod control;
pub mod deploy;
pub mod gateway;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod render;
pub mod supervisor;
pub mod worker;

pub use config::AppServerConfig;
pub use gateway::GatewayServer;
pub use lifecycle::{AppServer, AppSource};
pub use supervisor::{Supervisor, SupervisorHandle};
pub use worker::Worker;
