use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::supervisor::{FleetPhase, FleetSnapshot};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: FleetPhase,
    pub workers: usize,
    pub ready: usize,
}

#[derive(Serialize)]
pub struct Accepted {
    pub event: &'static str,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.supervisor.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: snapshot.phase,
        workers: snapshot.workers.len(),
        ready: snapshot.ready_count(),
    })
}

pub async fn get_fleet(State(state): State<AdminState>) -> Json<FleetSnapshot> {
    Json(state.supervisor.snapshot())
}

pub async fn post_reload(State(state): State<AdminState>) -> (StatusCode, Json<Accepted>) {
    tracing::info!("Reload requested via admin API");
    state.supervisor.reload();
    (StatusCode::ACCEPTED, Json(Accepted { event: "reload" }))
}
