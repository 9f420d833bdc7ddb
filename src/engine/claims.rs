use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::engine::assignment::{not_found, push_audit};
use crate::engine::{eligibility, stage};
use crate::error::AppError;
use crate::events::RealtimeEvent;
use crate::models::audit::{Actor, AuditAction};
use crate::models::claim::{Claim, ClaimStatus};
use crate::models::trip::TripStatus;
use crate::state::AppState;

/// Registers the acting driver's claim on a trip. The count+insert runs
/// while the trip row is held exclusively, so the claim limit holds even
/// when many drivers hit the window at once.
pub fn create_claim(state: &AppState, actor: &Actor, trip_id: Uuid) -> Result<Claim, AppError> {
    let driver = state
        .drivers
        .get(&actor.id)
        .map(|entry| entry.value().clone());

    let trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let now = Utc::now();

    if trip.status == TripStatus::Canceled {
        return Err(AppError::NotActive);
    }
    if !stage::can_claim_now(&trip, now) {
        return Err(AppError::ClaimWindowClosed);
    }

    let verdict = eligibility::evaluate(driver.as_ref(), &trip);
    if !verdict.eligible {
        return Err(AppError::DriverNotEligible {
            reasons: verdict.reasons,
        });
    }

    let mut pending = 0usize;
    for entry in state.claims.iter() {
        let claim = entry.value();
        if claim.trip_id != trip_id {
            continue;
        }
        if claim.driver_id == actor.id {
            return Err(AppError::DuplicateClaim);
        }
        if claim.status == ClaimStatus::Pending {
            pending += 1;
        }
    }
    if pending >= state.claim_limit {
        return Err(AppError::ClaimLimitReached);
    }

    let claim = Claim {
        id: Uuid::new_v4(),
        trip_id,
        driver_id: actor.id,
        status: ClaimStatus::Pending,
        created_at: now,
        reviewed_at: None,
        reviewed_by: None,
    };
    state.claims.insert(claim.id, claim.clone());

    push_audit(
        state,
        actor,
        AuditAction::ClaimCreate,
        trip_id,
        json!({ "pendingClaims": pending }),
        json!({ "claimId": claim.id, "driverId": actor.id }),
    );

    drop(trip);

    state.metrics.claims_created_total.inc();
    tracing::info!(trip_id = %trip_id, driver_id = %actor.id, "claim created");
    state.events.publish(RealtimeEvent::driver(
        actor.id,
        "claim:created",
        json!({ "bookingId": trip_id, "claimId": claim.id }),
    ));

    Ok(claim)
}

/// Pending-claim counts per trip, for `claimsRemaining` on list views.
pub fn pending_counts(state: &AppState) -> std::collections::HashMap<Uuid, usize> {
    let mut counts = std::collections::HashMap::new();
    for entry in state.claims.iter() {
        let claim = entry.value();
        if claim.status == ClaimStatus::Pending {
            *counts.entry(claim.trip_id).or_insert(0) += 1;
        }
    }
    counts
}
