use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::payout::CommissionBreakdown;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("driver not found")]
    DriverNotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing or invalid actor identity")]
    Unauthorized,

    #[error("actor role does not allow this action")]
    Forbidden,

    #[error("booking already has a driver assigned")]
    AlreadyAssigned,

    #[error("booking has no driver assigned")]
    NotAssigned,

    #[error("booking already has no driver")]
    AlreadyUnassigned,

    #[error("booking is not active")]
    NotActive,

    #[error("trip is already underway")]
    InProgress,

    #[error("booking status does not allow this action")]
    BadStatus,

    #[error("booking is not paid")]
    NotPaid,

    #[error("claim is not pending")]
    ClaimNotPending,

    #[error("claim belongs to the currently assigned driver")]
    SameDriver,

    #[error("driver not eligible: {}", .reasons.join(", "))]
    DriverNotEligible { reasons: Vec<String> },

    #[error("claim window is not open for this trip")]
    ClaimWindowClosed,

    #[error("claim limit reached for this trip")]
    ClaimLimitReached,

    #[error("driver already has a claim on this trip")]
    DuplicateClaim,

    #[error("payout already marked as paid")]
    AlreadyPaid,

    #[error("commission must be acknowledged before the payout is applied")]
    CommissionNotAcknowledged { breakdown: CommissionBreakdown },

    #[error("payouts are disabled")]
    PayoutsDisabled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DriverNotFound => "DRIVER_NOT_FOUND",
            AppError::BadRequest(_) => "VALIDATION",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::AlreadyAssigned => "ALREADY_ASSIGNED",
            AppError::NotAssigned => "NOT_ASSIGNED",
            AppError::AlreadyUnassigned => "ALREADY_UNASSIGNED",
            AppError::NotActive => "NOT_ACTIVE",
            AppError::InProgress => "IN_PROGRESS",
            AppError::BadStatus => "BAD_STATUS",
            AppError::NotPaid => "NOT_PAID",
            AppError::ClaimNotPending => "CLAIM_NOT_PENDING",
            AppError::SameDriver => "SAME_DRIVER",
            AppError::DriverNotEligible { .. } => "DRIVER_NOT_ELIGIBLE",
            AppError::ClaimWindowClosed => "CLAIM_WINDOW_CLOSED",
            AppError::ClaimLimitReached => "CLAIM_LIMIT_REACHED",
            AppError::DuplicateClaim => "DUPLICATE_CLAIM",
            AppError::AlreadyPaid => "ALREADY_PAID",
            AppError::CommissionNotAcknowledged { .. } => "COMMISSION_NOT_ACKNOWLEDGED",
            AppError::PayoutsDisabled => "PAYOUTS_DISABLED",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::DriverNotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::DriverNotEligible { reasons } => json!({
                "error": self.to_string(),
                "code": self.code(),
                "reasons": reasons,
            }),
            AppError::CommissionNotAcknowledged { breakdown } => json!({
                "error": self.to_string(),
                "code": self.code(),
                "commission": breakdown,
            }),
            _ => json!({
                "error": self.to_string(),
                "code": self.code(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
