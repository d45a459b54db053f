use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth;
use crate::board;
use crate::engine::coordinator;
use crate::error::AppError;
use crate::models::profile::Role;
use crate::presence::Relevance;
use crate::state::AppState;

/// Websocket auth rides query parameters because browsers cannot set headers
/// on the upgrade request: `token` is a session token, `track` a share token.
#[derive(Deserialize)]
pub struct PositionsQuery {
    pub token: Option<String>,
    pub track: Option<Uuid>,
}

#[derive(Debug, Clone, Copy)]
enum Viewer {
    Admin,
    Passenger(Uuid),
    TrackedBooking(Uuid),
}

pub async fn positions_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<PositionsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = resolve_viewer(&state, &query)?;
    Ok(ws.on_upgrade(move |socket| stream_positions(socket, state, viewer)))
}

fn resolve_viewer(state: &AppState, query: &PositionsQuery) -> Result<Viewer, AppError> {
    if let Some(share_token) = query.track {
        let booking_id = state
            .share_tokens
            .get(&share_token)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                AppError::NotFound("tracking link is invalid or expired".to_string())
            })?;
        return Ok(Viewer::TrackedBooking(booking_id));
    }

    let token = query.token.as_deref().ok_or(AppError::Unauthenticated)?;
    let user_id = auth::require_token(state, token)?;
    let profile = auth::require_role_for(
        state,
        user_id,
        &[Role::Passenger, Role::Driver, Role::Admin],
    )?;

    Ok(match profile.role {
        Role::Admin => Viewer::Admin,
        _ => Viewer::Passenger(user_id),
    })
}

/// Relevance is recomputed per send so an assignment made mid-session shows
/// up on the passenger's map without reconnecting.
fn relevance_of(state: &AppState, viewer: Viewer) -> Relevance {
    match viewer {
        Viewer::Admin => Relevance::FullFleet,
        Viewer::Passenger(user_id) => {
            Relevance::Drivers(coordinator::active_driver_ids(state, user_id))
        }
        Viewer::TrackedBooking(booking_id) => {
            let driver_id = state
                .bookings
                .get(&booking_id)
                .and_then(|entry| entry.value().driver_id);
            Relevance::single(driver_id)
        }
    }
}

async fn stream_positions(socket: WebSocket, state: Arc<AppState>, viewer: Viewer) {
    let (mut sender, mut receiver) = socket.split();

    info!("position subscriber connected");

    let send_state = state;
    let send_task = tokio::spawn(async move {
        let mut events = send_state.presence.subscribe();

        // Snapshot on join, then one refreshed snapshot per presence change.
        loop {
            let relevance = relevance_of(&send_state, viewer);
            let snapshot = relevance.filter(send_state.presence.snapshot());
            let json = match serde_json::to_string(&snapshot) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize position snapshot");
                    break;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }

            match events.recv().await {
                Ok(_) => {}
                // Dropped events are fine: the next iteration re-reads the
                // full snapshot anyway.
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("position subscriber disconnected");
}

#[derive(Deserialize)]
pub struct BoardQuery {
    pub token: String,
}

pub async fn board_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<BoardQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = auth::require_token(&state, &query.token)?;
    auth::require_role_for(&state, user_id, &[Role::Admin])?;

    Ok(ws.on_upgrade(move |socket| stream_board(socket, state)))
}

/// Pushes a fresh dispatch board on every booking change and on a fixed
/// interval; the interval masks change notifications lost to broadcast lag.
async fn stream_board(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    info!("dispatch board subscriber connected");

    let send_state = state;
    let send_task = tokio::spawn(async move {
        let mut changes = send_state.booking_events_tx.subscribe();
        let mut poll = tokio::time::interval(send_state.board_poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // The first interval tick fires immediately and doubles as the
        // initial board send.
        loop {
            let trigger = tokio::select! {
                changed = changes.recv() => match changed {
                    Ok(_) | Err(RecvError::Lagged(_)) => "change",
                    Err(RecvError::Closed) => break,
                },
                _ = poll.tick() => "poll",
            };

            send_state
                .metrics
                .board_refreshes_total
                .with_label_values(&[trigger])
                .inc();

            let rows = board::dispatch_board(&send_state);
            let json = match serde_json::to_string(&rows) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize dispatch board");
                    break;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("dispatch board subscriber disconnected");
}
