//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fleet_workers_live` (gauge): workers currently forked and not exited
//! - `fleet_worker_exits_total` (counter): worker exits by cause
//! - `fleet_worker_restarts_total` (counter): replacement forks
//! - `gateway_cache_lookups_total` (counter): cache probes by outcome
//! - `gateway_cache_stores_total` (counter): interception writes by outcome
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub mod names {
    pub const FLEET_WORKERS_LIVE: &str = "fleet_workers_live";
    pub const FLEET_WORKER_EXITS_TOTAL: &str = "fleet_worker_exits_total";
    pub const FLEET_WORKER_RESTARTS_TOTAL: &str = "fleet_worker_restarts_total";
    pub const GATEWAY_CACHE_LOOKUPS_TOTAL: &str = "gateway_cache_lookups_total";
    pub const GATEWAY_CACHE_STORES_TOTAL: &str = "gateway_cache_stores_total";
}

/// Install the Prometheus exporter with its own scrape listener.
///
/// Must be called inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn set_workers_live(count: usize) {
    gauge!(names::FLEET_WORKERS_LIVE).set(count as f64);
}

pub fn record_worker_exit(cause: &'static str) {
    counter!(names::FLEET_WORKER_EXITS_TOTAL, "cause" => cause).increment(1);
}

pub fn record_worker_restart() {
    counter!(names::FLEET_WORKER_RESTARTS_TOTAL).increment(1);
}

/// `outcome` is one of `hit`, `miss` or `error`.
pub fn record_cache_lookup(outcome: &'static str) {
    counter!(names::GATEWAY_CACHE_LOOKUPS_TOTAL, "outcome" => outcome).increment(1);
}

/// `outcome` is `stored` or `error`.
pub fn record_cache_store(outcome: &'static str) {
    counter!(names::GATEWAY_CACHE_STORES_TOTAL, "outcome" => outcome).increment(1);
}
