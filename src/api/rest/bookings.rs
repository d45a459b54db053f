use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth;
use crate::board::{self, BookingWithParties, PartySummary};
use crate::engine::coordinator::{self, AssignmentDetails, NewBooking};
use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus, ServiceType};
use crate::models::profile::Role;
use crate::models::rating::Rating;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking).get(list_my_bookings))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/assign", post(assign_driver))
        .route("/bookings/:id/status", patch(update_status))
        .route("/bookings/:id/rating", post(rate_booking))
        .route("/dispatch/board", get(dispatch_board))
        .route("/track/:token", get(track))
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub service_type: ServiceType,
    pub service_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub pickup_details: serde_json::Value,
    #[serde(default)]
    pub contact_info: serde_json::Value,
    pub idempotency_key: String,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    let passenger_id = auth::require_authenticated(&state, &headers)?;

    let booking = coordinator::create_booking(
        &state,
        passenger_id,
        NewBooking {
            service_type: payload.service_type,
            service_id: payload.service_id,
            date: payload.date,
            pickup_details: payload.pickup_details,
            contact_info: payload.contact_info,
            idempotency_key: payload.idempotency_key,
        },
    )?;

    Ok(Json(booking))
}

async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Booking>>, AppError> {
    let passenger_id = auth::require_authenticated(&state, &headers)?;
    Ok(Json(coordinator::user_bookings(&state, passenger_id)))
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let passenger_id = auth::require_authenticated(&state, &headers)?;
    let booking = coordinator::cancel_own_booking(&state, passenger_id, id)?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
    pub price: Option<f64>,
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<Booking>, AppError> {
    auth::require_role(&state, &headers, &[Role::Admin])?;

    let booking = coordinator::assign_driver(
        &state,
        id,
        AssignmentDetails {
            driver_id: payload.driver_id,
            price: payload.price,
        },
    )?;

    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Booking>, AppError> {
    let caller = auth::require_role(&state, &headers, &[Role::Admin, Role::Driver])?;
    let booking = coordinator::update_status(&state, &caller, id, payload.status)?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct RateBookingRequest {
    pub score: u8,
    pub comment: Option<String>,
}

async fn rate_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateBookingRequest>,
) -> Result<Json<Rating>, AppError> {
    let passenger_id = auth::require_authenticated(&state, &headers)?;
    let rating = coordinator::rate_booking(&state, passenger_id, id, payload.score, payload.comment)?;
    Ok(Json(rating))
}

async fn dispatch_board(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingWithParties>>, AppError> {
    auth::require_role(&state, &headers, &[Role::Admin])?;

    state
        .metrics
        .board_refreshes_total
        .with_label_values(&["manual"])
        .inc();

    Ok(Json(board::dispatch_board(&state)))
}

/// Public tracking view resolved from a share token. Exposes the driver
/// summary but never the passenger's identity.
#[derive(Serialize)]
pub struct TrackView {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub date: NaiveDate,
    pub pickup_details: serde_json::Value,
    pub driver: Option<PartySummary>,
}

async fn track(
    State(state): State<Arc<AppState>>,
    Path(token): Path<Uuid>,
) -> Result<Json<TrackView>, AppError> {
    let booking_id = state
        .share_tokens
        .get(&token)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound("tracking link is invalid or expired".to_string()))?;

    let booking = state
        .bookings
        .get(&booking_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound("tracking link is invalid or expired".to_string()))?;

    let driver = booking
        .driver_id
        .and_then(|driver_id| state.profiles.get(&driver_id))
        .map(|profile| PartySummary::from(profile.value()));

    Ok(Json(TrackView {
        booking_id: booking.id,
        status: booking.status,
        date: booking.date,
        pickup_details: booking.pickup_details,
        driver,
    }))
}
