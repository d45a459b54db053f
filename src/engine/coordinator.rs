use chrono::{NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::machine::{self, Actor, DriverEffect, Event};
use crate::error::AppError;
use crate::models::booking::{Booking, BookingStatus, ServiceType};
use crate::models::profile::{DriverStatus, Profile, Role};
use crate::models::rating::Rating;
use crate::state::{AppState, BookingChanged};

pub struct NewBooking {
    pub service_type: ServiceType,
    pub service_id: String,
    pub date: NaiveDate,
    pub pickup_details: serde_json::Value,
    pub contact_info: serde_json::Value,
    pub idempotency_key: String,
}

pub struct AssignmentDetails {
    pub driver_id: Uuid,
    pub price: Option<f64>,
}

/// Creates at most one booking per (passenger, idempotency key) pair. The
/// key is reserved under the map entry lock before the row is written, so a
/// racing retry sees the reservation and gets `DuplicateRequest`.
pub fn create_booking(
    state: &AppState,
    passenger_id: Uuid,
    input: NewBooking,
) -> Result<Booking, AppError> {
    if input.idempotency_key.trim().is_empty() {
        state.record_booking_outcome("rejected");
        return Err(AppError::Validation(
            "idempotency key must not be empty".to_string(),
        ));
    }
    if input.service_id.trim().is_empty() {
        state.record_booking_outcome("rejected");
        return Err(AppError::Validation(
            "service id must not be empty".to_string(),
        ));
    }

    let booking = Booking {
        id: Uuid::new_v4(),
        passenger_id,
        driver_id: None,
        service_type: input.service_type,
        service_id: input.service_id,
        date: input.date,
        pickup_details: input.pickup_details,
        contact_info: input.contact_info,
        price: None,
        status: BookingStatus::Pending,
        idempotency_key: input.idempotency_key.clone(),
        share_token: Uuid::new_v4(),
        created_at: Utc::now(),
    };

    match state
        .idempotency
        .entry((passenger_id, input.idempotency_key))
    {
        Entry::Occupied(existing) => {
            state.record_booking_outcome("duplicate");
            return Err(AppError::DuplicateRequest(format!(
                "booking {} already exists for this request",
                existing.get()
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(booking.id);
        }
    }

    state.share_tokens.insert(booking.share_token, booking.id);
    state.bookings.insert(booking.id, booking.clone());
    notify_change(state, booking.id);
    state.record_booking_outcome("created");

    info!(booking_id = %booking.id, passenger_id = %passenger_id, "booking created");
    Ok(booking)
}

/// Caller's own bookings, newest first.
pub fn user_bookings(state: &AppState, passenger_id: Uuid) -> Vec<Booking> {
    let mut bookings: Vec<Booking> = state
        .bookings
        .iter()
        .filter(|entry| entry.value().passenger_id == passenger_id)
        .map(|entry| entry.value().clone())
        .collect();

    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    bookings
}

pub fn assign_driver(
    state: &AppState,
    booking_id: Uuid,
    details: AssignmentDetails,
) -> Result<Booking, AppError> {
    let is_driver = state
        .profiles
        .get(&details.driver_id)
        .map(|entry| entry.value().role == Role::Driver)
        .unwrap_or(false);

    if !is_driver {
        return Err(AppError::NotFound(format!(
            "driver {} not found",
            details.driver_id
        )));
    }

    apply_transition(
        state,
        booking_id,
        Event::Assign,
        |_booking| Ok(Actor::Admin),
        Some(details),
    )
}

/// Owner-only cancel; legal only while the trip has not started.
pub fn cancel_own_booking(
    state: &AppState,
    passenger_id: Uuid,
    booking_id: Uuid,
) -> Result<Booking, AppError> {
    apply_transition(
        state,
        booking_id,
        Event::Cancel,
        move |booking| {
            if booking.passenger_id != passenger_id {
                return Err(AppError::Forbidden(
                    "only the booking owner may cancel it".to_string(),
                ));
            }
            Ok(Actor::OwningPassenger)
        },
        None,
    )
}

/// Status change requested by an admin or by the assigned driver. The target
/// status is mapped to a lifecycle event; `pending` and `assigned` cannot be
/// requested directly (assignment has its own operation).
pub fn update_status(
    state: &AppState,
    caller: &Profile,
    booking_id: Uuid,
    target: BookingStatus,
) -> Result<Booking, AppError> {
    let event = match target {
        BookingStatus::DriverAccepted => Event::Accept,
        BookingStatus::EnRoute => Event::StartTrip,
        BookingStatus::Completed => Event::Complete,
        BookingStatus::Cancelled => Event::Cancel,
        BookingStatus::Pending | BookingStatus::Assigned => {
            return Err(AppError::InvalidTransition(format!(
                "status {target} cannot be requested directly"
            )));
        }
    };

    let caller_id = caller.id;
    let caller_role = caller.role;

    apply_transition(
        state,
        booking_id,
        event,
        move |booking| match caller_role {
            Role::Admin => Ok(Actor::Admin),
            Role::Driver if booking.driver_id == Some(caller_id) => Ok(Actor::AssignedDriver),
            Role::Driver => Err(AppError::Forbidden(
                "only the assigned driver may update this booking".to_string(),
            )),
            Role::Passenger => Err(AppError::Forbidden(
                "passengers cancel through their own bookings".to_string(),
            )),
        },
        None,
    )
}

/// Driver self toggle. Going offline also removes the driver from the
/// presence snapshot.
pub fn set_driver_status(
    state: &AppState,
    driver_id: Uuid,
    status: DriverStatus,
) -> Result<Profile, AppError> {
    let updated = {
        let mut profile = state
            .profiles
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        profile.driver_status = Some(status);
        profile.value().clone()
    };

    if status == DriverStatus::Offline {
        state.presence.leave(driver_id);
        state
            .metrics
            .online_drivers
            .set(state.presence.online_count() as i64);
    }

    info!(driver_id = %driver_id, status = ?status, "driver status updated");
    Ok(updated)
}

pub fn rate_booking(
    state: &AppState,
    passenger_id: Uuid,
    booking_id: Uuid,
    score: u8,
    comment: Option<String>,
) -> Result<Rating, AppError> {
    if !(1..=5).contains(&score) {
        return Err(AppError::Validation(
            "score must be between 1 and 5".to_string(),
        ));
    }

    let booking = state
        .bookings
        .get(&booking_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

    if booking.passenger_id != passenger_id {
        return Err(AppError::Forbidden(
            "only the booking owner may rate it".to_string(),
        ));
    }
    if booking.status != BookingStatus::Completed {
        return Err(AppError::InvalidTransition(format!(
            "cannot rate a booking in status {}",
            booking.status
        )));
    }
    let driver_id = booking.driver_id.ok_or_else(|| {
        AppError::Storage(format!("completed booking {booking_id} has no driver"))
    })?;

    let rating = Rating {
        id: Uuid::new_v4(),
        booking_id,
        rater_id: passenger_id,
        driver_id,
        score,
        comment,
        created_at: Utc::now(),
    };

    match state.ratings.entry(booking_id) {
        Entry::Occupied(_) => Err(AppError::DuplicateRequest(format!(
            "booking {booking_id} has already been rated"
        ))),
        Entry::Vacant(slot) => {
            slot.insert(rating.clone());
            Ok(rating)
        }
    }
}

/// Driver ids tied to the passenger's active bookings; the passenger's live
/// map is filtered to exactly this set.
pub fn active_driver_ids(state: &AppState, passenger_id: Uuid) -> std::collections::HashSet<Uuid> {
    state
        .bookings
        .iter()
        .filter(|entry| {
            let booking = entry.value();
            booking.passenger_id == passenger_id
                && matches!(
                    booking.status,
                    BookingStatus::Assigned | BookingStatus::DriverAccepted | BookingStatus::EnRoute
                )
        })
        .filter_map(|entry| entry.value().driver_id)
        .collect()
}

/// Evaluates and applies one transition as a compare-and-swap under the
/// booking's entry lock. The actor closure also carries the ownership check,
/// so a rejected caller never mutates the row. Driver side effects run after
/// the row commits.
fn apply_transition<F>(
    state: &AppState,
    booking_id: Uuid,
    event: Event,
    actor_of: F,
    assignment: Option<AssignmentDetails>,
) -> Result<Booking, AppError>
where
    F: FnOnce(&Booking) -> Result<Actor, AppError>,
{
    let (updated, effect, effect_driver) = {
        let mut entry = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        let actor = actor_of(entry.value())?;
        let transition = machine::apply(entry.status, event, actor).map_err(|err| {
            state.record_transition(event, "rejected");
            err
        })?;

        let prior_driver = entry.driver_id;
        entry.status = transition.to;
        if let Some(details) = &assignment {
            entry.driver_id = Some(details.driver_id);
            if details.price.is_some() {
                entry.price = details.price;
            }
        }

        let effect_driver = match transition.effect {
            DriverEffect::MarkBusy => entry.driver_id,
            DriverEffect::Release => prior_driver,
            DriverEffect::None => None,
        };

        (entry.value().clone(), transition.effect, effect_driver)
    };

    match (effect, effect_driver) {
        (DriverEffect::MarkBusy, Some(driver_id)) => {
            flip_driver_status(state, driver_id, DriverStatus::Busy);
        }
        (DriverEffect::Release, Some(driver_id)) => {
            flip_driver_status(state, driver_id, DriverStatus::Available);
        }
        _ => {}
    }

    notify_change(state, booking_id);
    state.record_transition(event, "success");

    info!(
        booking_id = %booking_id,
        event = %event,
        status = %updated.status,
        "booking transitioned"
    );

    Ok(updated)
}

fn flip_driver_status(state: &AppState, driver_id: Uuid, status: DriverStatus) {
    match state.profiles.get_mut(&driver_id) {
        Some(mut profile) => profile.driver_status = Some(status),
        None => warn!(driver_id = %driver_id, "driver profile missing during status flip"),
    }
}

fn notify_change(state: &AppState, booking_id: Uuid) {
    let _ = state.booking_events_tx.send(BookingChanged { booking_id });
}

impl AppState {
    fn record_booking_outcome(&self, outcome: &str) {
        self.metrics
            .bookings_total
            .with_label_values(&[outcome])
            .inc();
    }

    fn record_transition(&self, event: Event, outcome: &str) {
        let event_label = event.to_string();
        self.metrics
            .booking_transitions_total
            .with_label_values(&[event_label.as_str(), outcome])
            .inc();
    }
}
