use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::Actor;
use crate::models::driver::{Driver, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/suspend", post(suspend_driver))
        .route("/drivers/:id/unsuspend", post(unsuspend_driver))
        .route("/drivers/:id/availability", patch(update_availability))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDriverRequest {
    pub name: String,
    pub region: Option<String>,
    pub operation_area: Option<String>,
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub is_vip_driver: bool,
    #[serde(default)]
    pub rating: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailabilityRequest {
    pub available: bool,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    actor.require_admin()?;

    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name,
        role: Role::Driver,
        region: payload.region,
        operation_area: payload.operation_area,
        vehicle_type: payload.vehicle_type,
        is_vip_driver: payload.is_vip_driver,
        suspended_at: None,
        is_disabled: false,
        available: true,
        rating: payload.rating.clamp(0.0, 5.0),
        created_at: now,
        updated_at: now,
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Driver>>, AppError> {
    actor.require_admin()?;

    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Ok(Json(drivers))
}

async fn suspend_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Driver>, AppError> {
    actor.require_admin()?;

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or(AppError::DriverNotFound)?;

    driver.suspended_at = Some(Utc::now());
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn unsuspend_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Driver>, AppError> {
    actor.require_admin()?;

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or(AppError::DriverNotFound)?;

    driver.suspended_at = None;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Driver>, AppError> {
    // drivers may toggle their own flag; admins may toggle anyone's
    if actor.role != Role::Admin && actor.id != id {
        return Err(AppError::Forbidden);
    }

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or(AppError::DriverNotFound)?;

    driver.available = payload.available;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}
