use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::position::PositionSample;

/// Change notifications emitted by the channel. Subscribers treat these as a
/// hint to re-read the snapshot; delivery is lossy under lag.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Updated(PositionSample),
    Left(Uuid),
}

/// Broadcast channel with presence semantics: the latest sample per driver id
/// is the entire state. Joining yields the current snapshot; a driver leaving
/// (or going offline) disappears from it. Nothing is persisted.
pub struct PresenceChannel {
    publishers: DashMap<Uuid, PositionSample>,
    events_tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceChannel {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        Self {
            publishers: DashMap::new(),
            events_tx,
        }
    }

    /// Last sample wins per driver id.
    pub fn publish(&self, sample: PositionSample) {
        self.publishers.insert(sample.driver_id, sample.clone());
        let _ = self.events_tx.send(PresenceEvent::Updated(sample));
    }

    pub fn leave(&self, driver_id: Uuid) {
        if self.publishers.remove(&driver_id).is_some() {
            let _ = self.events_tx.send(PresenceEvent::Left(driver_id));
        }
    }

    pub fn snapshot(&self) -> Vec<PositionSample> {
        self.publishers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events_tx.subscribe()
    }

    pub fn online_count(&self) -> usize {
        self.publishers.len()
    }
}

/// Which drivers a given viewer is allowed to see on the live map.
#[derive(Debug, Clone)]
pub enum Relevance {
    /// Admin fleet view.
    FullFleet,
    /// Drivers tied to the viewer's active bookings.
    Drivers(HashSet<Uuid>),
}

impl Relevance {
    pub fn single(driver_id: Option<Uuid>) -> Self {
        Relevance::Drivers(driver_id.into_iter().collect())
    }

    pub fn matches(&self, driver_id: Uuid) -> bool {
        match self {
            Relevance::FullFleet => true,
            Relevance::Drivers(ids) => ids.contains(&driver_id),
        }
    }

    pub fn filter(&self, snapshot: Vec<PositionSample>) -> Vec<PositionSample> {
        snapshot
            .into_iter()
            .filter(|sample| self.matches(sample.driver_id))
            .collect()
    }
}
