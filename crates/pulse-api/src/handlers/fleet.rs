//! /fleet handlers: the fleet status report.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use pulse_services::{FleetStatus, ServiceRecord};

use super::ApiState;

pub async fn handle_fleet(State(state): State<ApiState>) -> Json<FleetStatus> {
    Json(state.manager.store().group_by_key())
}

pub async fn handle_fleet_group(
    State(state): State<ApiState>,
    Path(grouping_key): Path<String>,
) -> Result<Json<Vec<ServiceRecord>>, (StatusCode, String)> {
    let records = state.manager.store().group(&grouping_key);
    if records.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("no services registered under {grouping_key:?}"),
        ));
    }
    Ok(Json(records))
}
