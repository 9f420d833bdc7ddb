use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::eligibility;
use crate::error::AppError;
use crate::events::RealtimeEvent;
use crate::models::audit::{Actor, AuditAction, AuditEntry};
use crate::models::claim::ClaimStatus;
use crate::models::driver::Role;
use crate::models::trip::{PaymentStatus, Trip, TripStatus};
use crate::state::AppState;

pub(crate) fn not_found(kind: &str, id: Uuid) -> AppError {
    AppError::NotFound(format!("{kind} {id}"))
}

fn require_reason(reason: &str) -> Result<&str, AppError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("reason is required".to_string()));
    }
    Ok(trimmed)
}

fn trip_snapshot(trip: &Trip) -> Value {
    json!({
        "driverId": trip.driver_id,
        "status": trip.status,
        "paymentStatus": trip.payment_status,
    })
}

pub(crate) fn push_audit(
    state: &AppState,
    actor: &Actor,
    action: AuditAction,
    entity_id: Uuid,
    before: Value,
    after: Value,
) {
    let entry = AuditEntry {
        id: Uuid::new_v4(),
        actor_id: actor.id,
        actor_role: actor.role,
        action,
        entity: "trip".to_string(),
        entity_id,
        before,
        after,
        ip: actor.ip.clone(),
        user_agent: actor.user_agent.clone(),
        created_at: Utc::now(),
    };
    state.audit_log.insert(entry.id, entry);
}

/// Accepts one claim and rejects its siblings. Runs under the caller's trip
/// guard; ids are collected before any claim guard is taken.
fn settle_claims(
    state: &AppState,
    trip_id: Uuid,
    accepted_claim_id: Uuid,
    reviewer: Uuid,
    now: DateTime<Utc>,
    include_accepted: bool,
) {
    let sibling_ids: Vec<Uuid> = state
        .claims
        .iter()
        .filter(|entry| {
            let claim = entry.value();
            claim.trip_id == trip_id
                && claim.id != accepted_claim_id
                && (claim.status == ClaimStatus::Pending
                    || (include_accepted && claim.status == ClaimStatus::Accepted))
        })
        .map(|entry| *entry.key())
        .collect();

    for id in sibling_ids {
        if let Some(mut claim) = state.claims.get_mut(&id) {
            claim.status = ClaimStatus::Rejected;
            claim.reviewed_at = Some(now);
            claim.reviewed_by = Some(reviewer);
        }
    }

    if let Some(mut accepted) = state.claims.get_mut(&accepted_claim_id) {
        accepted.status = ClaimStatus::Accepted;
        accepted.reviewed_at = Some(now);
        accepted.reviewed_by = Some(reviewer);
    }
}

/// Puts every claim on the trip back to pending so the marketplace restarts.
fn reopen_claims(state: &AppState, trip_id: Uuid) {
    let claim_ids: Vec<Uuid> = state
        .claims
        .iter()
        .filter(|entry| entry.value().trip_id == trip_id)
        .map(|entry| *entry.key())
        .collect();

    for id in claim_ids {
        if let Some(mut claim) = state.claims.get_mut(&id) {
            claim.status = ClaimStatus::Pending;
            claim.reviewed_at = None;
            claim.reviewed_by = None;
        }
    }
}

/// Awards a pending claim: the trip gets the claimant as driver, the claim
/// is accepted and every sibling pending claim rejected, all while the trip
/// row is held exclusively.
pub fn award(
    state: &AppState,
    actor: &Actor,
    trip_id: Uuid,
    claim_id: Uuid,
    reason: &str,
) -> Result<Trip, AppError> {
    let reason = require_reason(reason)?;

    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let claim = state
        .claims
        .get(&claim_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| not_found("claim", claim_id))?;
    if claim.trip_id != trip_id {
        return Err(not_found("claim", claim_id));
    }

    if trip.driver_id.is_some() {
        return Err(AppError::AlreadyAssigned);
    }
    if trip.payment_status != PaymentStatus::Paid {
        return Err(AppError::NotPaid);
    }
    if claim.status != ClaimStatus::Pending {
        return Err(AppError::ClaimNotPending);
    }

    let before = trip_snapshot(&trip);
    let now = Utc::now();

    trip.driver_id = Some(claim.driver_id);
    trip.status = TripStatus::Confirmed;
    trip.updated_at = now;

    settle_claims(state, trip_id, claim_id, actor.id, now, false);

    push_audit(
        state,
        actor,
        AuditAction::Award,
        trip_id,
        before,
        json!({
            "driverId": claim.driver_id,
            "status": trip.status,
            "claimId": claim_id,
            "reason": reason,
        }),
    );

    let updated = trip.clone();
    drop(trip);

    tracing::info!(trip_id = %trip_id, driver_id = %claim.driver_id, "claim awarded");
    state.events.publish(RealtimeEvent::driver(
        claim.driver_id,
        "trip:awarded",
        json!({ "bookingId": trip_id, "claimId": claim_id }),
    ));
    state
        .notifier
        .notify(claim.driver_id, "Your claim was accepted");

    Ok(updated)
}

/// Moves an already-assigned trip to a different driver's claim.
pub fn reassign(
    state: &AppState,
    actor: &Actor,
    trip_id: Uuid,
    claim_id: Uuid,
    reason: &str,
) -> Result<Trip, AppError> {
    let reason = require_reason(reason)?;

    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let claim = state
        .claims
        .get(&claim_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| not_found("claim", claim_id))?;
    if claim.trip_id != trip_id {
        return Err(not_found("claim", claim_id));
    }

    let Some(previous_driver) = trip.driver_id else {
        return Err(AppError::NotAssigned);
    };
    if matches!(
        trip.status,
        TripStatus::InProgress | TripStatus::Completed | TripStatus::Canceled
    ) {
        return Err(AppError::BadStatus);
    }
    if trip.payment_status != PaymentStatus::Paid {
        return Err(AppError::NotPaid);
    }
    if claim.driver_id == previous_driver {
        return Err(AppError::SameDriver);
    }

    let before = trip_snapshot(&trip);
    let now = Utc::now();

    trip.driver_id = Some(claim.driver_id);
    trip.status = TripStatus::Confirmed;
    trip.updated_at = now;

    settle_claims(state, trip_id, claim_id, actor.id, now, true);

    push_audit(
        state,
        actor,
        AuditAction::Reassign,
        trip_id,
        before,
        json!({
            "driverId": claim.driver_id,
            "previousDriverId": previous_driver,
            "status": trip.status,
            "claimId": claim_id,
            "reason": reason,
        }),
    );

    let updated = trip.clone();
    drop(trip);

    tracing::info!(
        trip_id = %trip_id,
        driver_id = %claim.driver_id,
        previous_driver_id = %previous_driver,
        "trip reassigned"
    );
    state.events.publish(RealtimeEvent::driver(
        claim.driver_id,
        "trip:awarded",
        json!({ "bookingId": trip_id, "claimId": claim_id }),
    ));
    state.events.publish(RealtimeEvent::driver(
        previous_driver,
        "trip:unassigned",
        json!({ "bookingId": trip_id }),
    ));
    state
        .notifier
        .notify(claim.driver_id, "Your claim was accepted");
    state
        .notifier
        .notify(previous_driver, "A trip was reassigned away from you");

    Ok(updated)
}

/// Takes the driver off a claim-awarded trip and reopens the marketplace:
/// every claim on the trip goes back to pending.
pub fn unassign(
    state: &AppState,
    actor: &Actor,
    trip_id: Uuid,
    reason: &str,
) -> Result<Trip, AppError> {
    let reason = require_reason(reason)?;

    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let Some(previous_driver) = trip.driver_id else {
        return Err(AppError::NotAssigned);
    };
    if matches!(
        trip.status,
        TripStatus::InProgress | TripStatus::Completed | TripStatus::Canceled
    ) {
        return Err(AppError::BadStatus);
    }
    if trip.payment_status != PaymentStatus::Paid {
        return Err(AppError::NotPaid);
    }

    let before = trip_snapshot(&trip);
    let now = Utc::now();

    trip.driver_id = None;
    trip.status = TripStatus::Pending;
    trip.updated_at = now;

    reopen_claims(state, trip_id);

    push_audit(
        state,
        actor,
        AuditAction::Unassign,
        trip_id,
        before,
        json!({
            "driverId": Value::Null,
            "previousDriverId": previous_driver,
            "status": trip.status,
            "reason": reason,
        }),
    );

    let updated = trip.clone();
    drop(trip);

    tracing::info!(trip_id = %trip_id, previous_driver_id = %previous_driver, "trip unassigned");
    state.events.publish(RealtimeEvent::driver(
        previous_driver,
        "trip:unassigned",
        json!({ "bookingId": trip_id }),
    ));
    state
        .notifier
        .notify(previous_driver, "You were unassigned from a trip");

    Ok(updated)
}

/// Admin picks a driver directly, bypassing the claim marketplace. Claims
/// on the trip are left untouched.
pub fn direct_assign(
    state: &AppState,
    actor: &Actor,
    trip_id: Uuid,
    driver_id: Uuid,
    reason: &str,
) -> Result<Trip, AppError> {
    let reason = require_reason(reason)?;

    let driver = state
        .drivers
        .get(&driver_id)
        .map(|entry| entry.value().clone());

    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    if driver.is_none() {
        return Err(AppError::DriverNotFound);
    }
    if trip.driver_id.is_some() {
        return Err(AppError::AlreadyAssigned);
    }
    if matches!(trip.status, TripStatus::Completed | TripStatus::Canceled) {
        return Err(AppError::NotActive);
    }

    let verdict = eligibility::evaluate(driver.as_ref(), &trip);
    if !verdict.eligible {
        return Err(AppError::DriverNotEligible {
            reasons: verdict.reasons,
        });
    }

    let before = trip_snapshot(&trip);
    let now = Utc::now();

    trip.driver_id = Some(driver_id);
    if trip.status == TripStatus::Pending {
        trip.status = TripStatus::Confirmed;
    }
    trip.updated_at = now;

    push_audit(
        state,
        actor,
        AuditAction::DirectAssign,
        trip_id,
        before,
        json!({
            "driverId": driver_id,
            "status": trip.status,
            "reason": reason,
        }),
    );

    let updated = trip.clone();
    drop(trip);

    tracing::info!(trip_id = %trip_id, driver_id = %driver_id, "driver directly assigned");
    state.events.publish(RealtimeEvent::driver(
        driver_id,
        "trip:assigned",
        json!({ "bookingId": trip_id }),
    ));
    state
        .notifier
        .notify(driver_id, "You have been assigned a new trip");

    Ok(updated)
}

/// Admin pulls the driver off a trip that has not started yet. Claims are
/// reopened so the marketplace restarts.
pub fn direct_unassign(
    state: &AppState,
    actor: &Actor,
    trip_id: Uuid,
    reason: &str,
) -> Result<Trip, AppError> {
    let reason = require_reason(reason)?;

    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let Some(previous_driver) = trip.driver_id else {
        return Err(AppError::AlreadyUnassigned);
    };
    if matches!(trip.status, TripStatus::Completed | TripStatus::Canceled) {
        return Err(AppError::NotActive);
    }
    if trip.status == TripStatus::InProgress {
        return Err(AppError::InProgress);
    }

    let before = trip_snapshot(&trip);
    let now = Utc::now();

    trip.driver_id = None;
    trip.status = TripStatus::Pending;
    trip.updated_at = now;

    reopen_claims(state, trip_id);

    push_audit(
        state,
        actor,
        AuditAction::DirectUnassign,
        trip_id,
        before,
        json!({
            "driverId": Value::Null,
            "previousDriverId": previous_driver,
            "status": trip.status,
            "reason": reason,
        }),
    );

    let updated = trip.clone();
    drop(trip);

    tracing::info!(trip_id = %trip_id, previous_driver_id = %previous_driver, "driver directly unassigned");
    state.events.publish(RealtimeEvent::driver(
        previous_driver,
        "trip:unassigned",
        json!({ "bookingId": trip_id }),
    ));
    state
        .notifier
        .notify(previous_driver, "You were unassigned from a trip");

    Ok(updated)
}

const CANCEL_REASON_MIN: usize = 40;
const CANCEL_REASON_MAX: usize = 800;

/// Admin cancellation. The reason is appended to the trip's notes as a
/// timestamped record; the assigned driver, if any, keeps the attribution.
pub fn cancel(
    state: &AppState,
    actor: &Actor,
    trip_id: Uuid,
    reason: &str,
) -> Result<Trip, AppError> {
    let trimmed = reason.trim();
    if trimmed.len() < CANCEL_REASON_MIN || trimmed.len() > CANCEL_REASON_MAX {
        return Err(AppError::BadRequest(format!(
            "cancellation reason must be between {CANCEL_REASON_MIN} and {CANCEL_REASON_MAX} characters"
        )));
    }

    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    if matches!(trip.status, TripStatus::Completed | TripStatus::Canceled) {
        return Err(AppError::NotActive);
    }

    let before = trip_snapshot(&trip);
    let now = Utc::now();

    let note = format!(
        "[{}] Canceled by admin: {trimmed}",
        now.format("%Y-%m-%d %H:%M UTC")
    );
    if trip.notes.is_empty() {
        trip.notes = note;
    } else {
        trip.notes = format!("{}\n{note}", trip.notes);
    }
    trip.status = TripStatus::Canceled;
    trip.updated_at = now;

    push_audit(
        state,
        actor,
        AuditAction::Cancel,
        trip_id,
        before,
        json!({
            "status": trip.status,
            "reason": trimmed,
        }),
    );

    let updated = trip.clone();
    let driver_id = updated.driver_id;
    drop(trip);

    tracing::info!(trip_id = %trip_id, "trip canceled by admin");
    if let Some(driver_id) = driver_id {
        state.events.publish(RealtimeEvent::driver(
            driver_id,
            "trip:canceled",
            json!({ "bookingId": trip_id }),
        ));
        state
            .notifier
            .notify(driver_id, "A trip you were assigned was canceled");
    }

    Ok(updated)
}

/// The assigned driver (or an admin) marks the trip underway.
pub fn start_trip(state: &AppState, actor: &Actor, trip_id: Uuid) -> Result<Trip, AppError> {
    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let Some(driver_id) = trip.driver_id else {
        return Err(AppError::NotAssigned);
    };
    if actor.role != Role::Admin && actor.id != driver_id {
        return Err(AppError::Forbidden);
    }
    if trip.status != TripStatus::Confirmed {
        return Err(AppError::BadStatus);
    }
    if trip.payment_status != PaymentStatus::Paid {
        return Err(AppError::NotPaid);
    }

    let before = trip_snapshot(&trip);
    trip.status = TripStatus::InProgress;
    trip.updated_at = Utc::now();

    push_audit(
        state,
        actor,
        AuditAction::TripStart,
        trip_id,
        before,
        json!({ "status": trip.status }),
    );

    let updated = trip.clone();
    drop(trip);

    tracing::info!(trip_id = %trip_id, driver_id = %driver_id, "trip started");
    state.events.publish(RealtimeEvent::driver(
        driver_id,
        "trip:started",
        json!({ "bookingId": trip_id }),
    ));

    Ok(updated)
}

/// The assigned driver (or an admin) marks the trip completed.
pub fn complete_trip(state: &AppState, actor: &Actor, trip_id: Uuid) -> Result<Trip, AppError> {
    let mut trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let Some(driver_id) = trip.driver_id else {
        return Err(AppError::NotAssigned);
    };
    if actor.role != Role::Admin && actor.id != driver_id {
        return Err(AppError::Forbidden);
    }
    if trip.status != TripStatus::InProgress {
        return Err(AppError::BadStatus);
    }

    let before = trip_snapshot(&trip);
    trip.status = TripStatus::Completed;
    trip.updated_at = Utc::now();

    push_audit(
        state,
        actor,
        AuditAction::TripComplete,
        trip_id,
        before,
        json!({ "status": trip.status }),
    );

    let updated = trip.clone();
    drop(trip);

    tracing::info!(trip_id = %trip_id, driver_id = %driver_id, "trip completed");
    state.events.publish(RealtimeEvent::driver(
        driver_id,
        "trip:completed",
        json!({ "bookingId": trip_id }),
    ));

    Ok(updated)
}
