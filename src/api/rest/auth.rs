use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::Actor;
use crate::models::driver::Role;

fn header_string(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// The upstream gateway authenticates the session and forwards the actor
/// identity in headers; requests without one are refused.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_string(parts, "x-actor-id")
            .and_then(|raw| Uuid::parse_str(&raw).ok())
            .ok_or(AppError::Unauthorized)?;

        let role = match header_string(parts, "x-actor-role").as_deref() {
            Some("ADMIN") => Role::Admin,
            Some("DRIVER") => Role::Driver,
            _ => return Err(AppError::Unauthorized),
        };

        Ok(Actor {
            id,
            role,
            ip: header_string(parts, "x-forwarded-for"),
            user_agent: header_string(parts, "user-agent"),
        })
    }
}

impl Actor {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}
