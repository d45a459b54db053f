use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Passenger debrief for a completed booking. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub rater_id: Uuid,
    pub driver_id: Uuid,
    pub score: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
