use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::engine::assignment::{not_found, push_audit};
use crate::error::AppError;
use crate::models::audit::{Actor, AuditAction};
use crate::models::payout::{CommissionBreakdown, Payout, PayoutStatus};
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn compute_commission(gross: f64, percent: f64) -> CommissionBreakdown {
    let commission_amount = round2(gross * percent / 100.0);
    CommissionBreakdown {
        gross_amount: gross,
        commission_percent: percent,
        commission_amount,
        net_paid: round2(gross - commission_amount),
    }
}

pub struct PayoutRequest {
    pub acknowledge_commission: bool,
    pub payment_method: Option<String>,
    pub payment_ref: Option<String>,
}

struct PayoutContext {
    trip: Trip,
    breakdown: CommissionBreakdown,
    existing: Option<Payout>,
}

/// Shared preconditions for approve and pay. Runs under the caller-held
/// trip guard via the state maps; the missing-acknowledgement conflict
/// carries the computed breakdown so the operator sees the number before
/// confirming it.
fn payout_context(
    state: &AppState,
    trip: &Trip,
    request: &PayoutRequest,
) -> Result<PayoutContext, AppError> {
    if trip.status != TripStatus::Completed {
        return Err(AppError::BadStatus);
    }
    if trip.driver_id.is_none() {
        return Err(AppError::NotAssigned);
    }
    if trip.amount <= 0.0 {
        return Err(AppError::BadRequest(
            "trip amount must be positive".to_string(),
        ));
    }

    let breakdown = compute_commission(trip.amount, state.commission_percent);
    if !request.acknowledge_commission {
        return Err(AppError::CommissionNotAcknowledged { breakdown });
    }

    let existing = state.payouts.get(&trip.id).map(|entry| entry.value().clone());
    if existing
        .as_ref()
        .is_some_and(|payout| payout.status == PayoutStatus::Paid)
    {
        return Err(AppError::AlreadyPaid);
    }

    Ok(PayoutContext {
        trip: trip.clone(),
        breakdown,
        existing,
    })
}

/// Idempotent upsert: marks the trip's payout approved.
pub fn approve(
    state: &AppState,
    actor: &Actor,
    trip_id: Uuid,
    request: &PayoutRequest,
) -> Result<(Trip, Payout), AppError> {
    if !state.capabilities.payouts {
        return Err(AppError::PayoutsDisabled);
    }

    let trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let context = payout_context(state, &trip, request)?;
    let now = Utc::now();

    let payout = Payout {
        trip_id,
        status: PayoutStatus::Approved,
        gross_amount: context.breakdown.gross_amount,
        commission_percent: context.breakdown.commission_percent,
        commission_amount: context.breakdown.commission_amount,
        net_paid: context.breakdown.net_paid,
        approved_at: Some(now),
        approved_by: Some(actor.id),
        paid_at: None,
        paid_by: None,
        payment_method: request.payment_method.clone(),
        payment_ref: request.payment_ref.clone(),
    };
    state.payouts.insert(trip_id, payout.clone());

    push_audit(
        state,
        actor,
        AuditAction::PayoutApprove,
        trip_id,
        json!({ "payout": context.existing }),
        json!({ "payout": payout }),
    );

    drop(trip);

    tracing::info!(trip_id = %trip_id, net_paid = payout.net_paid, "payout approved");
    Ok((context.trip, payout))
}

/// Idempotent upsert: marks the trip's payout paid. May be called without a
/// prior approve, in which case the approval fields are back-filled from
/// the same actor. `Paid` is terminal.
pub fn pay(
    state: &AppState,
    actor: &Actor,
    trip_id: Uuid,
    request: &PayoutRequest,
) -> Result<(Trip, Payout), AppError> {
    if !state.capabilities.payouts {
        return Err(AppError::PayoutsDisabled);
    }

    let trip = state
        .trips
        .get_mut(&trip_id)
        .ok_or_else(|| not_found("trip", trip_id))?;

    let context = payout_context(state, &trip, request)?;
    let now = Utc::now();
    let existing = context.existing.clone();

    let payout = Payout {
        trip_id,
        status: PayoutStatus::Paid,
        gross_amount: context.breakdown.gross_amount,
        commission_percent: context.breakdown.commission_percent,
        commission_amount: context.breakdown.commission_amount,
        net_paid: context.breakdown.net_paid,
        approved_at: existing
            .as_ref()
            .and_then(|payout| payout.approved_at)
            .or(Some(now)),
        approved_by: existing
            .as_ref()
            .and_then(|payout| payout.approved_by)
            .or(Some(actor.id)),
        paid_at: Some(now),
        paid_by: Some(actor.id),
        payment_method: request
            .payment_method
            .clone()
            .or_else(|| existing.as_ref().and_then(|payout| payout.payment_method.clone())),
        payment_ref: request
            .payment_ref
            .clone()
            .or_else(|| existing.as_ref().and_then(|payout| payout.payment_ref.clone())),
    };
    state.payouts.insert(trip_id, payout.clone());

    push_audit(
        state,
        actor,
        AuditAction::PayoutPay,
        trip_id,
        json!({ "payout": existing }),
        json!({ "payout": payout }),
    );

    drop(trip);

    tracing::info!(trip_id = %trip_id, net_paid = payout.net_paid, "payout paid");
    if let Some(driver_id) = context.trip.driver_id {
        state.notifier.notify(driver_id, "Your trip payout was sent");
    }

    Ok((context.trip, payout))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{approve, compute_commission, pay, round2, PayoutRequest};
    use crate::config::Config;
    use crate::error::AppError;
    use crate::events::NoopPublisher;
    use crate::models::audit::Actor;
    use crate::models::driver::Role;
    use crate::models::payout::PayoutStatus;
    use crate::models::trip::{PaymentStatus, Trip, TripStatus, VehicleType};
    use crate::state::AppState;

    fn test_state(payouts_enabled: bool) -> AppState {
        let config = Config {
            http_port: 0,
            log_level: "info".to_string(),
            event_buffer_size: 16,
            claim_limit: 5,
            commission_percent: 10.0,
            payouts_enabled,
        };
        AppState::with_publisher(&config, Arc::new(NoopPublisher::new()))
    }

    fn admin() -> Actor {
        Actor {
            id: Uuid::from_u128(999),
            role: Role::Admin,
            ip: None,
            user_agent: None,
        }
    }

    fn seed_completed_trip(state: &AppState, amount: f64) -> Uuid {
        let now = Utc::now();
        let trip = Trip {
            id: Uuid::new_v4(),
            scheduled_at: now - Duration::hours(2),
            driver_id: Some(Uuid::from_u128(1)),
            status: TripStatus::Completed,
            payment_status: PaymentStatus::Paid,
            vehicle_type: VehicleType::Car,
            pickup_region: Some("Dar es Salaam".to_string()),
            dropoff_region: None,
            property_region: None,
            amount,
            currency: "TZS".to_string(),
            notes: String::new(),
            rating: None,
            created_at: now,
            updated_at: now,
        };
        let id = trip.id;
        state.trips.insert(id, trip);
        id
    }

    fn acknowledged() -> PayoutRequest {
        PayoutRequest {
            acknowledge_commission: true,
            payment_method: None,
            payment_ref: None,
        }
    }

    #[test]
    fn commission_math_rounds_to_two_decimals() {
        let breakdown = compute_commission(100_000.0, 10.0);
        assert_eq!(breakdown.commission_amount, 10_000.0);
        assert_eq!(breakdown.net_paid, 90_000.0);

        let odd = compute_commission(12_345.67, 10.0);
        assert_eq!(odd.commission_amount, 1_234.57);
        assert_eq!(odd.net_paid, 11_111.10);

        assert_eq!(round2(0.005), 0.01);
    }

    #[test]
    fn missing_acknowledgement_returns_breakdown_without_applying() {
        let state = test_state(true);
        let trip_id = seed_completed_trip(&state, 100_000.0);

        let request = PayoutRequest {
            acknowledge_commission: false,
            payment_method: None,
            payment_ref: None,
        };
        let err = approve(&state, &admin(), trip_id, &request).unwrap_err();
        let AppError::CommissionNotAcknowledged { breakdown } = err else {
            panic!("expected CommissionNotAcknowledged");
        };
        assert_eq!(breakdown.commission_amount, 10_000.0);
        assert!(state.payouts.get(&trip_id).is_none());
    }

    #[test]
    fn pay_twice_fails_with_already_paid_and_keeps_amounts() {
        let state = test_state(true);
        let trip_id = seed_completed_trip(&state, 100_000.0);

        let (_, payout) = pay(&state, &admin(), trip_id, &acknowledged()).unwrap();
        assert_eq!(payout.status, PayoutStatus::Paid);
        assert_eq!(payout.net_paid, 90_000.0);

        let err = pay(&state, &admin(), trip_id, &acknowledged()).unwrap_err();
        assert!(matches!(err, AppError::AlreadyPaid));

        let stored = state.payouts.get(&trip_id).unwrap().clone();
        assert_eq!(stored.net_paid, 90_000.0);
        assert_eq!(stored.commission_amount, 10_000.0);
    }

    #[test]
    fn pay_without_prior_approve_backfills_approval() {
        let state = test_state(true);
        let trip_id = seed_completed_trip(&state, 50_000.0);

        let (_, payout) = pay(&state, &admin(), trip_id, &acknowledged()).unwrap();
        assert!(payout.approved_at.is_some());
        assert_eq!(payout.approved_by, Some(admin().id));
        assert_eq!(payout.paid_by, Some(admin().id));
    }

    #[test]
    fn approve_is_an_idempotent_upsert() {
        let state = test_state(true);
        let trip_id = seed_completed_trip(&state, 50_000.0);

        approve(&state, &admin(), trip_id, &acknowledged()).unwrap();
        let (_, second) = approve(&state, &admin(), trip_id, &acknowledged()).unwrap();
        assert_eq!(second.status, PayoutStatus::Approved);
        assert_eq!(second.net_paid, 45_000.0);
    }

    #[test]
    fn approve_after_pay_is_rejected() {
        let state = test_state(true);
        let trip_id = seed_completed_trip(&state, 50_000.0);

        pay(&state, &admin(), trip_id, &acknowledged()).unwrap();
        let err = approve(&state, &admin(), trip_id, &acknowledged()).unwrap_err();
        assert!(matches!(err, AppError::AlreadyPaid));
    }

    #[test]
    fn incomplete_trip_cannot_be_paid_out() {
        let state = test_state(true);
        let trip_id = seed_completed_trip(&state, 50_000.0);
        state.trips.get_mut(&trip_id).unwrap().status = TripStatus::Confirmed;

        let err = approve(&state, &admin(), trip_id, &acknowledged()).unwrap_err();
        assert!(matches!(err, AppError::BadStatus));
    }

    #[test]
    fn payouts_capability_flag_gates_both_operations() {
        let state = test_state(false);
        let trip_id = seed_completed_trip(&state, 50_000.0);

        let err = approve(&state, &admin(), trip_id, &acknowledged()).unwrap_err();
        assert!(matches!(err, AppError::PayoutsDisabled));
        let err = pay(&state, &admin(), trip_id, &acknowledged()).unwrap_err();
        assert!(matches!(err, AppError::PayoutsDisabled));
    }
}
