//! /status, /connections, /sweep handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use pulse_services::{ConnectionInfo, SweepReport};

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub records: usize,
    pub online: usize,
    pub offline: usize,
    pub groups: usize,
    pub active_connections: usize,
    pub completed_connections: u64,
    pub transport: Option<&'static str>,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let counts = state.manager.store().counts();

    Json(StatusResponse {
        records: counts.records,
        online: counts.online,
        offline: counts.offline,
        groups: counts.groups,
        active_connections: state.manager.active_connections(),
        completed_connections: state.manager.completed_connections(),
        transport: state.transport,
    })
}

// ── /connections ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionInfo>,
}

pub async fn handle_connections(State(state): State<ApiState>) -> Json<ConnectionsResponse> {
    Json(ConnectionsResponse {
        connections: state.manager.connections(),
    })
}

// ── /sweep ────────────────────────────────────────────────────────────────────

pub async fn handle_sweep(State(state): State<ApiState>) -> Json<SweepReport> {
    let report = state.manager.sweep_now();
    tracing::info!(went_offline = report.went_offline, "sweep requested via API");
    Json(report)
}
