use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::trip::{Trip, TripStatus};

/// Drivers may claim a trip during the 72 hours before its scheduled time.
pub const CLAIM_WINDOW_HOURS: i64 = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStage {
    Waiting,
    ClaimOpen,
    Assigned,
    InProgress,
    Completed,
    All,
}

pub fn claim_window() -> Duration {
    Duration::hours(CLAIM_WINDOW_HOURS)
}

pub fn claim_opens_at(trip: &Trip) -> DateTime<Utc> {
    trip.scheduled_at - claim_window()
}

pub fn classify(trip: &Trip, now: DateTime<Utc>) -> TripStage {
    if trip.status == TripStatus::Completed {
        return TripStage::Completed;
    }
    if trip.status == TripStatus::InProgress {
        return TripStage::InProgress;
    }
    if trip.driver_id.is_some() {
        return TripStage::Assigned;
    }
    if trip.scheduled_at > now + claim_window() {
        return TripStage::Waiting;
    }
    if now <= trip.scheduled_at {
        return TripStage::ClaimOpen;
    }
    // fallback bucket, e.g. past-due unassigned trips
    TripStage::All
}

pub fn can_claim_now(trip: &Trip, now: DateTime<Utc>) -> bool {
    now >= claim_opens_at(trip) && now <= trip.scheduled_at && trip.driver_id.is_none()
}
