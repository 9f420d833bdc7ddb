use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Pending,
    PendingAssignment,
    Confirmed,
    InProgress,
    Completed,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Boda,
    Bajaji,
    Car,
    Xl,
    Premium,
}

/// A scheduled ground-transport booking requiring exactly one driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub driver_id: Option<Uuid>,
    pub status: TripStatus,
    pub payment_status: PaymentStatus,
    pub vehicle_type: VehicleType,
    pub pickup_region: Option<String>,
    pub dropoff_region: Option<String>,
    pub property_region: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub notes: String,
    /// Post-trip customer rating, written by the storefront after completion.
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
