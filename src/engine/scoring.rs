use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::eligibility;
use crate::models::claim::Claim;
use crate::models::driver::Driver;
use crate::models::trip::{Trip, TripStatus, VehicleType};
use crate::state::AppState;

pub const DISQUALIFIED_SCORE: f64 = -999.0;

const RELIABILITY_WEIGHT: f64 = 45.0;
const EXPERIENCE_WEIGHT: f64 = 5.0;
const RATING_WEIGHT: f64 = 10.0;
const FAIRNESS_WEIGHT: f64 = 5.0;
const AREA_MATCH_BONUS: f64 = 8.0;
const CLAIM_SPEED_WEIGHT: f64 = 2.0;

const DEFAULT_COMPLETION_RATE: f64 = 0.75;
const DEFAULT_RATING_SCORE: f64 = 6.0;
const MAX_REASONS: usize = 3;

/// Trailing-window aggregates over a driver's trip history.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverHistory {
    pub completed_90d: u32,
    pub canceled_90d: u32,
    pub avg_rating_180d: Option<f64>,
    pub workload_7d: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecommendation {
    pub claim_id: Uuid,
    pub recommended: bool,
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Advisory per-claim scoring input: the claim, its driver record, and the
/// driver's history aggregates.
pub struct ScoringInput<'a> {
    pub claim: &'a Claim,
    pub driver: Option<&'a Driver>,
    pub history: DriverHistory,
}

/// Read-only scan of the trip store. Runs without locks; the result may be
/// stale relative to concurrent writes, which is fine for an advisory
/// ranking surfaced to a human operator.
pub fn driver_history(state: &AppState, driver_id: Uuid, now: DateTime<Utc>) -> DriverHistory {
    let mut history = DriverHistory::default();
    let mut rating_sum = 0.0;
    let mut rating_count = 0u32;

    let window_90d = now - Duration::days(90);
    let window_180d = now - Duration::days(180);
    let window_7d = now - Duration::days(7);

    for entry in state.trips.iter() {
        let trip = entry.value();
        if trip.driver_id != Some(driver_id) {
            continue;
        }

        if trip.scheduled_at >= window_90d && trip.scheduled_at <= now {
            match trip.status {
                TripStatus::Completed => history.completed_90d += 1,
                TripStatus::Canceled => history.canceled_90d += 1,
                _ => {}
            }
        }

        if trip.status == TripStatus::Completed && trip.scheduled_at >= window_180d {
            if let Some(rating) = trip.rating {
                rating_sum += rating;
                rating_count += 1;
            }
        }

        // upcoming confirmed work counts toward the anti-overload window
        if trip.scheduled_at >= window_7d
            && matches!(
                trip.status,
                TripStatus::Confirmed | TripStatus::InProgress | TripStatus::Completed
            )
        {
            history.workload_7d += 1;
        }
    }

    if rating_count > 0 {
        history.avg_rating_180d = Some(rating_sum / f64::from(rating_count));
    }

    history
}

/// Ranks a trip's pending claims. Exactly one non-disqualified claim comes
/// back `recommended`: the max-score one, first-wins on ties with claims
/// walked in `created_at` order.
pub fn recommend(trip: &Trip, inputs: &[ScoringInput<'_>]) -> Vec<ClaimRecommendation> {
    let mut order: Vec<usize> = (0..inputs.len()).collect();
    order.sort_by_key(|&i| (inputs[i].claim.created_at, inputs[i].claim.id));

    // denominator floors at 1, so a lone claimant takes full speed credit
    let denom = inputs.len().saturating_sub(1).max(1) as f64;

    let mut out = Vec::with_capacity(inputs.len());
    let mut best: Option<(usize, f64)> = None;

    for (rank, &i) in order.iter().enumerate() {
        let (recommendation, disqualified) = score_claim(trip, &inputs[i], rank, denom);
        if !disqualified {
            match best {
                Some((_, top)) if top >= recommendation.score => {}
                _ => best = Some((out.len(), recommendation.score)),
            }
        }
        out.push(recommendation);
    }

    if let Some((index, _)) = best {
        out[index].recommended = true;
    }

    out
}

fn disqualify(claim_id: Uuid, reason: &str) -> (ClaimRecommendation, bool) {
    (
        ClaimRecommendation {
            claim_id,
            recommended: false,
            score: DISQUALIFIED_SCORE,
            reasons: vec![reason.to_string()],
        },
        true,
    )
}

fn score_claim(
    trip: &Trip,
    input: &ScoringInput<'_>,
    rank: usize,
    denom: f64,
) -> (ClaimRecommendation, bool) {
    let claim_id = input.claim.id;

    let Some(driver) = input.driver else {
        return disqualify(claim_id, "Driver not found");
    };

    if driver.is_disabled || driver.suspended_at.is_some() {
        return disqualify(claim_id, "Driver suspended or disabled");
    }
    match trip.vehicle_type {
        VehicleType::Premium => {
            if !driver.is_vip_driver {
                return disqualify(claim_id, "VIP required");
            }
        }
        required => match driver
            .vehicle_type
            .as_deref()
            .and_then(eligibility::normalize_vehicle_type)
        {
            None => return disqualify(claim_id, "Vehicle type not set"),
            Some(normalized) if normalized != required => {
                return disqualify(claim_id, "Vehicle mismatch");
            }
            Some(_) => {}
        },
    }

    let history = &input.history;
    let mut reasons = Vec::new();

    let attempts = history.completed_90d + history.canceled_90d;
    let completion_rate = if attempts == 0 {
        DEFAULT_COMPLETION_RATE
    } else {
        f64::from(history.completed_90d) / f64::from(attempts)
    };
    let reliability = RELIABILITY_WEIGHT * completion_rate;
    if reliability >= 35.0 {
        reasons.push("High reliability".to_string());
    }

    let experience = EXPERIENCE_WEIGHT * (f64::from(history.completed_90d) / 20.0).min(1.0);
    if history.completed_90d >= 10 {
        reasons.push("Experienced".to_string());
    }

    let rating = match history.avg_rating_180d {
        Some(avg) => (avg.clamp(0.0, 5.0) / 5.0) * RATING_WEIGHT,
        None => DEFAULT_RATING_SCORE,
    };
    if history.avg_rating_180d.is_some_and(|avg| avg >= 4.5) {
        reasons.push("Top rated".to_string());
    }

    let workload = f64::from(history.workload_7d);
    let fairness = FAIRNESS_WEIGHT * (1.0 - (workload / 10.0).min(1.0)).max(0.0);
    if history.workload_7d <= 2 {
        reasons.push("Low recent workload".to_string());
    }

    let area = if eligibility::area_match(driver, trip) {
        AREA_MATCH_BONUS
    } else {
        0.0
    };
    if area > 0.0 {
        reasons.push("In service area".to_string());
    }

    let claim_speed = CLAIM_SPEED_WEIGHT * (1.0 - rank as f64 / denom);
    if claim_speed > 1.5 {
        reasons.push("Fast response".to_string());
    }

    reasons.truncate(MAX_REASONS);

    let score = reliability + experience + rating + fairness + area + claim_speed;
    (
        ClaimRecommendation {
            claim_id,
            recommended: false,
            score,
            reasons,
        },
        false,
    )
}
