use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth;
use crate::board;
use crate::engine::coordinator;
use crate::error::AppError;
use crate::models::position::{GeoPoint, PositionSample};
use crate::models::profile::{DriverStatus, Profile, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", get(list_drivers))
        .route("/drivers/status", patch(update_driver_status))
        .route("/drivers/position", post(publish_position))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct PublishPositionRequest {
    pub location: GeoPoint,
}

/// Driver roster for the admin assignment dropdown.
async fn list_drivers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Profile>>, AppError> {
    auth::require_role(&state, &headers, &[Role::Admin])?;
    Ok(Json(board::driver_roster(&state)))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Profile>, AppError> {
    let driver = auth::require_role(&state, &headers, &[Role::Driver])?;
    let updated = coordinator::set_driver_status(&state, driver.id, payload.status)?;
    Ok(Json(updated))
}

/// One GPS fix onto the presence channel; supersedes the driver's previous
/// sample.
async fn publish_position(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<PublishPositionRequest>,
) -> Result<Json<PositionSample>, AppError> {
    let driver = auth::require_role(&state, &headers, &[Role::Driver])?;

    let sample = PositionSample {
        driver_id: driver.id,
        full_name: driver.full_name.clone(),
        location: payload.location,
        status: driver.driver_status.unwrap_or(DriverStatus::Offline),
        recorded_at: Utc::now(),
    };

    state.presence.publish(sample.clone());
    state
        .metrics
        .online_drivers
        .set(state.presence.online_count() as i64);

    Ok(Json(sample))
}
