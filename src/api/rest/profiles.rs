use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::profile::{DriverStatus, Profile, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/register", post(register))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub profile: Profile,
    pub token: String,
}

/// Creates a profile and issues its bearer token. Drivers start offline;
/// everyone else has no duty status at all.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    if payload.full_name.trim().is_empty() {
        return Err(AppError::Validation("full_name cannot be empty".to_string()));
    }

    let profile = Profile {
        id: Uuid::new_v4(),
        full_name: payload.full_name,
        phone: payload.phone,
        role: payload.role,
        driver_status: (payload.role == Role::Driver).then_some(DriverStatus::Offline),
        created_at: Utc::now(),
    };

    state.profiles.insert(profile.id, profile.clone());
    let token = state.sessions.issue(profile.id);

    tracing::info!(profile_id = %profile.id, role = profile.role.as_str(), "profile registered");
    Ok(Json(RegisterResponse { profile, token }))
}
