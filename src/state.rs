use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::SessionTokens;
use crate::models::booking::Booking;
use crate::models::profile::Profile;
use crate::models::rating::Rating;
use crate::observability::metrics::Metrics;
use crate::presence::PresenceChannel;

/// Emitted whenever a booking row changes; consumed by the dispatch board
/// stream to trigger a refresh.
#[derive(Debug, Clone)]
pub struct BookingChanged {
    pub booking_id: Uuid,
}

pub struct AppState {
    pub profiles: DashMap<Uuid, Profile>,
    pub bookings: DashMap<Uuid, Booking>,
    /// Keyed by booking id; at most one rating per booking.
    pub ratings: DashMap<Uuid, Rating>,
    /// (passenger id, idempotency key) -> booking id.
    pub idempotency: DashMap<(Uuid, String), Uuid>,
    /// Public share token -> booking id.
    pub share_tokens: DashMap<Uuid, Uuid>,
    pub sessions: SessionTokens,
    pub presence: PresenceChannel,
    pub booking_events_tx: broadcast::Sender<BookingChanged>,
    pub board_poll_interval: Duration,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize, board_poll_interval: Duration) -> Self {
        let (booking_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            profiles: DashMap::new(),
            bookings: DashMap::new(),
            ratings: DashMap::new(),
            idempotency: DashMap::new(),
            share_tokens: DashMap::new(),
            sessions: SessionTokens::new(),
            presence: PresenceChannel::new(event_buffer_size),
            booking_events_tx,
            board_poll_interval,
            metrics: Metrics::new(),
        }
    }
}
