use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Best-effort realtime event. Rooms are keyed by driver id (`driver:<id>`)
/// so each connected driver only sees their own traffic.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub room: String,
    pub event: String,
    pub payload: Value,
}

impl RealtimeEvent {
    pub fn driver(driver_id: Uuid, event: &str, payload: Value) -> Self {
        Self {
            room: format!("driver:{driver_id}"),
            event: event.to_string(),
            payload,
        }
    }
}

/// Injected realtime publisher. Delivery is fire-and-forget: publishing
/// after a committed mutation must never fail that mutation.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: RealtimeEvent);
    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent>;
}

pub struct BroadcastPublisher {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl BroadcastPublisher {
    pub fn new(buffer: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer);
        Self { tx }
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: RealtimeEvent) {
        // send only fails when no receiver is subscribed
        let _ = self.tx.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }
}

/// Publisher that drops every event; used in tests.
pub struct NoopPublisher {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl NoopPublisher {
    pub fn new() -> Self {
        let (tx, _unused_rx) = broadcast::channel(1);
        Self { tx }
    }
}

impl Default for NoopPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: RealtimeEvent) {}

    fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }
}
