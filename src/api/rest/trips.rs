use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::assignment::{self, not_found};
use crate::engine::claims;
use crate::engine::eligibility;
use crate::engine::payout::{self, PayoutRequest};
use crate::engine::scoring::{self, ClaimRecommendation, ScoringInput};
use crate::engine::stage::{self, TripStage};
use crate::error::AppError;
use crate::models::audit::{Actor, AuditEntry};
use crate::models::claim::{Claim, ClaimStatus};
use crate::models::driver::{Driver, Role};
use crate::models::payout::Payout;
use crate::models::trip::{PaymentStatus, Trip, TripStatus, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips", post(create_trip))
        .route("/trips/scheduled", get(list_scheduled))
        .route("/trips/scheduled/:id", get(get_scheduled))
        .route("/trips/scheduled/:id/claims", post(create_claim))
        .route("/trips/scheduled/:id/award", post(award))
        .route("/trips/scheduled/:id/reassign", post(reassign))
        .route("/trips/scheduled/:id/unassign", post(unassign))
        .route("/trips/:id/eligible-drivers", get(eligible_drivers))
        .route("/trips/:id/assign", post(direct_assign))
        .route("/trips/:id/unassign", post(direct_unassign))
        .route("/trips/:id/cancel", post(cancel))
        .route("/trips/:id/start", post(start_trip))
        .route("/trips/:id/complete", post(complete_trip))
        .route("/trips/:id/audit", get(audit_trail))
        .route("/trips/:id/payout/approve", post(payout_approve))
        .route("/trips/:id/payout/pay", post(payout_pay))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripRequest {
    pub scheduled_at: DateTime<Utc>,
    pub vehicle_type: VehicleType,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub pickup_region: Option<String>,
    pub dropoff_region: Option<String>,
    pub property_region: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

fn default_currency() -> String {
    "TZS".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledQuery {
    pub stage: Option<TripStage>,
    /// Legacy alias for `stage`.
    pub bucket: Option<TripStage>,
    pub future_only: Option<bool>,
    pub payment_status: Option<PaymentStatus>,
    pub vehicle_type: Option<VehicleType>,
    pub q: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibleDriversQuery {
    pub q: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    pub claim_id: Option<Uuid>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectAssignRequest {
    pub driver_id: Option<Uuid>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutActionRequest {
    #[serde(default)]
    pub acknowledge_commission: bool,
    pub payment_method: Option<String>,
    pub payment_ref: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTripView {
    #[serde(flatten)]
    pub trip: Trip,
    pub stage: TripStage,
    pub claim_opens_at: DateTime<Utc>,
    pub can_claim_now: bool,
    pub claims_remaining: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimView {
    #[serde(flatten)]
    pub claim: Claim,
    pub driver: Option<Driver>,
    pub recommendation: Option<ClaimRecommendation>,
}

fn scheduled_view(
    trip: Trip,
    now: DateTime<Utc>,
    claim_limit: usize,
    pending: &HashMap<Uuid, usize>,
) -> ScheduledTripView {
    let stage = stage::classify(&trip, now);
    let claim_opens_at = stage::claim_opens_at(&trip);
    let can_claim_now = stage::can_claim_now(&trip, now);
    let pending_count = pending.get(&trip.id).copied().unwrap_or(0);

    ScheduledTripView {
        stage,
        claim_opens_at,
        can_claim_now,
        claims_remaining: claim_limit.saturating_sub(pending_count),
        trip,
    }
}

fn page_params(page: Option<usize>, page_size: Option<usize>) -> (usize, usize) {
    (page.unwrap_or(1).max(1), page_size.unwrap_or(20).clamp(1, 100))
}

/// Records outcome metrics for a dispatch action and wraps the mutated trip
/// in the standard response envelope.
fn track(
    state: &AppState,
    action: &str,
    started: Instant,
    result: Result<Trip, AppError>,
) -> Result<Json<Value>, AppError> {
    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[action])
        .observe(started.elapsed().as_secs_f64());
    state
        .metrics
        .dispatch_actions_total
        .with_label_values(&[action, outcome])
        .inc();

    result.map(|trip| Json(json!({ "success": true, "booking": trip })))
}

fn track_payout(
    state: &AppState,
    action: &str,
    started: Instant,
    result: Result<(Trip, Payout), AppError>,
) -> Result<Json<Value>, AppError> {
    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[action])
        .observe(started.elapsed().as_secs_f64());
    state
        .metrics
        .payouts_total
        .with_label_values(&[outcome])
        .inc();

    result.map(|(trip, payout)| Json(json!({ "success": true, "booking": trip, "payout": payout })))
}

async fn create_trip(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateTripRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;

    if payload.amount <= 0.0 {
        return Err(AppError::BadRequest("amount must be positive".to_string()));
    }

    let now = Utc::now();
    let trip = Trip {
        id: Uuid::new_v4(),
        scheduled_at: payload.scheduled_at,
        driver_id: None,
        status: TripStatus::Pending,
        payment_status: payload.payment_status.unwrap_or(PaymentStatus::Paid),
        vehicle_type: payload.vehicle_type,
        pickup_region: payload.pickup_region,
        dropoff_region: payload.dropoff_region,
        property_region: payload.property_region,
        amount: payload.amount,
        currency: payload.currency,
        notes: String::new(),
        rating: None,
        created_at: now,
        updated_at: now,
    };

    state.trips.insert(trip.id, trip.clone());
    tracing::info!(trip_id = %trip.id, "trip created");

    Ok(Json(json!({ "success": true, "booking": trip })))
}

async fn list_scheduled(
    State(state): State<Arc<AppState>>,
    _actor: Actor,
    Query(query): Query<ScheduledQuery>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let pending = claims::pending_counts(&state);

    let trips: Vec<Trip> = state
        .trips
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    let stage_filter = query.stage.or(query.bucket);
    let needle = query.q.as_deref().map(str::to_lowercase);

    let mut views: Vec<ScheduledTripView> = trips
        .into_iter()
        .filter(|trip| {
            query
                .payment_status
                .map_or(true, |status| trip.payment_status == status)
        })
        .filter(|trip| {
            query
                .vehicle_type
                .map_or(true, |vehicle| trip.vehicle_type == vehicle)
        })
        .filter(|trip| !query.future_only.unwrap_or(false) || trip.scheduled_at >= now)
        .filter(|trip| match needle.as_deref() {
            Some(needle) => {
                trip.id.to_string().contains(needle)
                    || [
                        trip.pickup_region.as_deref(),
                        trip.dropoff_region.as_deref(),
                        trip.property_region.as_deref(),
                    ]
                    .into_iter()
                    .flatten()
                    .any(|region| region.to_lowercase().contains(needle))
            }
            None => true,
        })
        .map(|trip| scheduled_view(trip, now, state.claim_limit, &pending))
        .filter(|view| stage_filter.map_or(true, |stage| view.stage == stage))
        .collect();

    views.sort_by_key(|view| (view.trip.scheduled_at, view.trip.id));

    let (page, page_size) = page_params(query.page, query.page_size);
    let total = views.len();
    let items: Vec<ScheduledTripView> = views
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": page,
        "pageSize": page_size,
    })))
}

async fn get_scheduled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    _actor: Actor,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();

    let trip = state
        .trips
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| not_found("trip", id))?;

    let mut trip_claims: Vec<Claim> = state
        .claims
        .iter()
        .filter(|entry| entry.value().trip_id == id)
        .map(|entry| entry.value().clone())
        .collect();
    trip_claims.sort_by_key(|claim| (claim.created_at, claim.id));

    let mut drivers_by_id: HashMap<Uuid, Driver> = HashMap::new();
    for claim in &trip_claims {
        if let Some(driver) = state.drivers.get(&claim.driver_id) {
            drivers_by_id.insert(claim.driver_id, driver.value().clone());
        }
    }

    let pending_claims: Vec<&Claim> = trip_claims
        .iter()
        .filter(|claim| claim.status == ClaimStatus::Pending)
        .collect();

    let histories: HashMap<Uuid, scoring::DriverHistory> = pending_claims
        .iter()
        .map(|claim| {
            (
                claim.driver_id,
                scoring::driver_history(&state, claim.driver_id, now),
            )
        })
        .collect();

    let inputs: Vec<ScoringInput<'_>> = pending_claims
        .iter()
        .map(|&claim| ScoringInput {
            claim,
            driver: drivers_by_id.get(&claim.driver_id),
            history: histories.get(&claim.driver_id).copied().unwrap_or_default(),
        })
        .collect();

    let mut recommendations: HashMap<Uuid, ClaimRecommendation> = scoring::recommend(&trip, &inputs)
        .into_iter()
        .map(|recommendation| (recommendation.claim_id, recommendation))
        .collect();

    let claims_remaining = state.claim_limit.saturating_sub(pending_claims.len());
    let view = ScheduledTripView {
        stage: stage::classify(&trip, now),
        claim_opens_at: stage::claim_opens_at(&trip),
        can_claim_now: stage::can_claim_now(&trip, now),
        claims_remaining,
        trip: trip.clone(),
    };

    let claim_views: Vec<ClaimView> = trip_claims
        .into_iter()
        .map(|claim| {
            let driver = drivers_by_id.get(&claim.driver_id).cloned();
            let recommendation = recommendations.remove(&claim.id);
            ClaimView {
                claim,
                driver,
                recommendation,
            }
        })
        .collect();

    Ok(Json(json!({ "booking": view, "claims": claim_views })))
}

async fn eligible_drivers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Query(query): Query<EligibleDriversQuery>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;

    let trip = state
        .trips
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| not_found("trip", id))?;

    let needle = query.q.as_deref().map(str::to_lowercase);

    let mut matches: Vec<Driver> = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|driver| driver.role == Role::Driver)
        .filter(|driver| eligibility::evaluate(Some(driver), &trip).eligible)
        .filter(|driver| {
            needle
                .as_deref()
                .map_or(true, |needle| driver.name.to_lowercase().contains(needle))
        })
        .collect();
    matches.sort_by(|a, b| a.name.cmp(&b.name));

    let (page, page_size) = page_params(query.page, query.page_size);
    let total = matches.len();
    let items: Vec<Driver> = matches
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Ok(Json(json!({
        "items": items,
        "total": total,
        "page": page,
        "pageSize": page_size,
    })))
}

async fn create_claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    if actor.role != Role::Driver {
        return Err(AppError::Forbidden);
    }

    let claim = claims::create_claim(&state, &actor, id)?;
    Ok(Json(json!({ "success": true, "claim": claim })))
}

async fn award(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<AwardRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;
    let claim_id = payload
        .claim_id
        .ok_or_else(|| AppError::BadRequest("claimId is required".to_string()))?;

    let started = Instant::now();
    let result = assignment::award(&state, &actor, id, claim_id, &payload.reason);
    track(&state, "award", started, result)
}

async fn reassign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<AwardRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;
    let claim_id = payload
        .claim_id
        .ok_or_else(|| AppError::BadRequest("claimId is required".to_string()))?;

    let started = Instant::now();
    let result = assignment::reassign(&state, &actor, id, claim_id, &payload.reason);
    track(&state, "reassign", started, result)
}

async fn unassign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;

    let started = Instant::now();
    let result = assignment::unassign(&state, &actor, id, &payload.reason);
    track(&state, "unassign", started, result)
}

async fn direct_assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<DirectAssignRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;
    let driver_id = payload
        .driver_id
        .ok_or_else(|| AppError::BadRequest("driverId is required".to_string()))?;

    let started = Instant::now();
    let result = assignment::direct_assign(&state, &actor, id, driver_id, &payload.reason);
    track(&state, "direct_assign", started, result)
}

async fn direct_unassign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;

    let started = Instant::now();
    let result = assignment::direct_unassign(&state, &actor, id, &payload.reason);
    track(&state, "direct_unassign", started, result)
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;

    let started = Instant::now();
    let result = assignment::cancel(&state, &actor, id, &payload.reason);
    track(&state, "cancel", started, result)
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let started = Instant::now();
    let result = assignment::start_trip(&state, &actor, id);
    track(&state, "start", started, result)
}

async fn complete_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let started = Instant::now();
    let result = assignment::complete_trip(&state, &actor, id);
    track(&state, "complete", started, result)
}

async fn audit_trail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;

    let mut entries: Vec<AuditEntry> = state
        .audit_log
        .iter()
        .filter(|entry| entry.value().entity_id == id)
        .map(|entry| entry.value().clone())
        .collect();
    entries.sort_by_key(|entry| entry.created_at);

    Ok(Json(json!({ "items": entries })))
}

async fn payout_approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<PayoutActionRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;

    let request = PayoutRequest {
        acknowledge_commission: payload.acknowledge_commission,
        payment_method: payload.payment_method,
        payment_ref: payload.payment_ref,
    };

    let started = Instant::now();
    let result = payout::approve(&state, &actor, id, &request);
    track_payout(&state, "payout_approve", started, result)
}

async fn payout_pay(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<PayoutActionRequest>,
) -> Result<Json<Value>, AppError> {
    actor.require_admin()?;

    let request = PayoutRequest {
        acknowledge_commission: payload.acknowledge_commission,
        payment_method: payload.payment_method,
        payment_ref: payload.payment_ref,
    };

    let started = Instant::now();
    let result = payout::pay(&state, &actor, id, &request);
    track_payout(&state, "payout_pay", started, result)
}
