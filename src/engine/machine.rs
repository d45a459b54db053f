use crate::error::AppError;
use crate::models::booking::BookingStatus;

/// The caller's relationship to the booking, resolved by the coordinator
/// before the transition is evaluated. Role membership is checked earlier by
/// the guard; this only distinguishes edges where the actor matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    AssignedDriver,
    OwningPassenger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Assign,
    Accept,
    StartTrip,
    Complete,
    Cancel,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Event::Assign => "assign",
            Event::Accept => "accept",
            Event::StartTrip => "start_trip",
            Event::Complete => "complete",
            Event::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// Driver-availability side effect attached to a legal transition. The
/// coordinator applies it to the profile row after the booking row commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEffect {
    None,
    MarkBusy,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: BookingStatus,
    pub effect: DriverEffect,
}

/// Evaluates one lifecycle event against the current status. Every edge not
/// listed here is an `InvalidTransition`; terminal states reject everything.
pub fn apply(current: BookingStatus, event: Event, actor: Actor) -> Result<Transition, AppError> {
    use BookingStatus::{Assigned, Cancelled, Completed, DriverAccepted, EnRoute, Pending};

    let transition = match (current, event, actor) {
        (Pending, Event::Assign, Actor::Admin) => Transition {
            to: Assigned,
            effect: DriverEffect::MarkBusy,
        },
        (Assigned, Event::Accept, Actor::AssignedDriver) => Transition {
            to: DriverAccepted,
            effect: DriverEffect::None,
        },
        (DriverAccepted, Event::StartTrip, Actor::AssignedDriver) => Transition {
            to: EnRoute,
            effect: DriverEffect::None,
        },
        (
            DriverAccepted | EnRoute,
            Event::Complete,
            Actor::Admin | Actor::AssignedDriver,
        ) => Transition {
            to: Completed,
            effect: DriverEffect::Release,
        },
        // In-progress trips cannot be aborted by the passenger.
        (
            Pending | Assigned | DriverAccepted,
            Event::Cancel,
            Actor::OwningPassenger,
        ) => Transition {
            to: Cancelled,
            effect: DriverEffect::Release,
        },
        (from, Event::Cancel, Actor::Admin) if !from.is_terminal() => Transition {
            to: Cancelled,
            effect: DriverEffect::Release,
        },
        (from, event, _) => {
            return Err(AppError::InvalidTransition(format!(
                "cannot {event} a booking in status {from}"
            )));
        }
    };

    Ok(transition)
}
