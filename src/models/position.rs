use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::profile::DriverStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One GPS fix from a driver. Ephemeral: each sample supersedes the previous
/// one from the same driver and nothing is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSample {
    pub driver_id: Uuid,
    pub full_name: String,
    pub location: GeoPoint,
    pub status: DriverStatus,
    pub recorded_at: DateTime<Utc>,
}
