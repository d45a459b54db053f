use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Fleet,
    Tour,
    Airport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Assigned,
    DriverAccepted,
    EnRoute,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Assigned => "assigned",
            BookingStatus::DriverAccepted => "driver_accepted",
            BookingStatus::EnRoute => "en_route",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub service_type: ServiceType,
    pub service_id: String,
    pub date: NaiveDate,
    /// Free-form pickup/destination/time document supplied by the client.
    pub pickup_details: serde_json::Value,
    /// Free-form contact document supplied by the client.
    pub contact_info: serde_json::Value,
    pub price: Option<f64>,
    pub status: BookingStatus,
    pub idempotency_key: String,
    /// Opaque token resolving this booking on the public tracking view.
    pub share_token: Uuid,
    pub created_at: DateTime<Utc>,
}
