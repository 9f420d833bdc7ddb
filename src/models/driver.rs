use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Driver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub region: Option<String>,
    /// Delimited list of additional regions the driver operates in.
    pub operation_area: Option<String>,
    /// Free-text vehicle description entered at onboarding.
    pub vehicle_type: Option<String>,
    pub is_vip_driver: bool,
    pub suspended_at: Option<DateTime<Utc>>,
    pub is_disabled: bool,
    pub available: bool,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
