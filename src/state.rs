use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::events::{BroadcastPublisher, EventPublisher};
use crate::models::audit::AuditEntry;
use crate::models::claim::Claim;
use crate::models::driver::Driver;
use crate::models::payout::Payout;
use crate::models::trip::Trip;
use crate::notify::{LogNotifier, Notifier};
use crate::observability::metrics::Metrics;

/// Optional features resolved once at startup and never re-checked per call.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub payouts: bool,
}

pub struct AppState {
    pub trips: DashMap<Uuid, Trip>,
    pub drivers: DashMap<Uuid, Driver>,
    pub claims: DashMap<Uuid, Claim>,
    pub payouts: DashMap<Uuid, Payout>,
    pub audit_log: DashMap<Uuid, AuditEntry>,
    pub events: Arc<dyn EventPublisher>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Metrics,
    pub claim_limit: usize,
    pub commission_percent: f64,
    pub capabilities: Capabilities,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_publisher(
            config,
            Arc::new(BroadcastPublisher::new(config.event_buffer_size)),
        )
    }

    pub fn with_publisher(config: &Config, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            trips: DashMap::new(),
            drivers: DashMap::new(),
            claims: DashMap::new(),
            payouts: DashMap::new(),
            audit_log: DashMap::new(),
            events,
            notifier: Arc::new(LogNotifier),
            metrics: Metrics::new(),
            claim_limit: config.claim_limit,
            commission_percent: config.commission_percent,
            capabilities: Capabilities {
                payouts: config.payouts_enabled,
            },
        }
    }
}
