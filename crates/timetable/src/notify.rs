//! Outbound notifications about schedule updates.

use std::sync::Arc;
use tracing::{info, warn};

use crate::db::ScheduleStore;

pub const SCHEDULE_UPDATE: &str = "schedule_update";

/// Receiver of pipeline notifications. Delivery is fire-and-forget: a sink
/// logs its own failures and never fails the sync that triggered it.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: &str, title: &str, body: &str);
}

/// Persists notifications so clients can poll `/notifications`.
pub struct StoreNotificationSink {
    store: Arc<ScheduleStore>,
}

impl StoreNotificationSink {
    pub fn new(store: Arc<ScheduleStore>) -> Self {
        Self { store }
    }
}

impl NotificationSink for StoreNotificationSink {
    fn notify(&self, kind: &str, title: &str, body: &str) {
        match self.store.insert_notification(kind, title, body) {
            Ok(id) => info!(notification_id = id, kind, "Notification stored"),
            Err(e) => warn!(kind, error = %e, "Failed to store notification"),
        }
    }
}

/// Drops everything; used when notifications are disabled.
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _kind: &str, _title: &str, _body: &str) {}
}
