use serde::Serialize;
use uuid::Uuid;

use crate::models::booking::Booking;
use crate::models::profile::Profile;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct PartySummary {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
}

impl From<&Profile> for PartySummary {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id,
            full_name: profile.full_name.clone(),
            phone: profile.phone.clone(),
        }
    }
}

/// One dispatch board row: the booking joined with its parties. The driver
/// summary is present only once a driver has been assigned.
#[derive(Debug, Clone, Serialize)]
pub struct BookingWithParties {
    pub booking: Booking,
    pub passenger: Option<PartySummary>,
    pub driver: Option<PartySummary>,
}

/// Full join of bookings against profiles, newest first. Recomputed on every
/// call; the board is deliberately uncached.
pub fn dispatch_board(state: &AppState) -> Vec<BookingWithParties> {
    let mut rows: Vec<BookingWithParties> = state
        .bookings
        .iter()
        .map(|entry| {
            let booking = entry.value().clone();
            let passenger = state
                .profiles
                .get(&booking.passenger_id)
                .map(|profile| PartySummary::from(profile.value()));
            let driver = booking
                .driver_id
                .and_then(|driver_id| state.profiles.get(&driver_id))
                .map(|profile| PartySummary::from(profile.value()));

            BookingWithParties {
                booking,
                passenger,
                driver,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.booking.created_at.cmp(&a.booking.created_at));
    rows
}

/// Driver roster for the assignment dropdown, sorted by display name.
pub fn driver_roster(state: &AppState) -> Vec<Profile> {
    let mut drivers: Vec<Profile> = state
        .profiles
        .iter()
        .filter(|entry| entry.value().role == crate::models::profile::Role::Driver)
        .map(|entry| entry.value().clone())
        .collect();

    drivers.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    drivers
}
