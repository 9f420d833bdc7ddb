use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Approved,
    Paid,
}

/// Commission/net split for a trip's gross amount, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionBreakdown {
    pub gross_amount: f64,
    pub commission_percent: f64,
    pub commission_amount: f64,
    pub net_paid: f64,
}

/// One-to-one with a completed trip. Once `Paid` the record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub trip_id: Uuid,
    pub status: PayoutStatus,
    pub gross_amount: f64,
    pub commission_percent: f64,
    pub commission_amount: f64,
    pub net_paid: f64,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<Uuid>,
    pub payment_method: Option<String>,
    pub payment_ref: Option<String>,
}
