use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::driver::Role;

/// Authenticated request identity, injected by the upstream auth gateway.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ClaimCreate,
    Award,
    Reassign,
    Unassign,
    DirectAssign,
    DirectUnassign,
    Cancel,
    TripStart,
    TripComplete,
    PayoutApprove,
    PayoutPay,
}

/// Append-only record of a mutation; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub actor_role: Role,
    pub action: AuditAction,
    pub entity: String,
    pub entity_id: Uuid,
    pub before: Value,
    pub after: Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
