use uuid::Uuid;

/// Best-effort notification dispatcher. Delivery mechanics (push, SMS,
/// email) live in an external service; a failed notification is logged and
/// dropped, never surfaced to the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, driver_id: Uuid, message: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, driver_id: Uuid, message: &str) {
        tracing::info!(driver_id = %driver_id, message, "notification dispatched");
    }
}
