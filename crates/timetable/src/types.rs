use std::sync::Arc;

use crate::auth::TokenIdentityProvider;
use crate::config::AppConfig;
use crate::db::ScheduleStore;
use crate::notify::{NoopSink, NotificationSink, StoreNotificationSink};
use crate::source::ScheduleSource;
use crate::sync::ScheduleSync;

/// State shared by every request handler.
pub struct AppState {
    pub store: Arc<ScheduleStore>,
    pub sync: Arc<ScheduleSync>,
    pub identity: TokenIdentityProvider,
}

impl AppState {
    /// Wires the store, the source and the notification sink together.
    pub fn new(config: &AppConfig, store: Arc<ScheduleStore>, source: Arc<dyn ScheduleSource>) -> Self {
        let sink: Arc<dyn NotificationSink> = if config.sync.notify_on_change {
            Arc::new(StoreNotificationSink::new(store.clone()))
        } else {
            Arc::new(NoopSink)
        };
        let sync = Arc::new(ScheduleSync::new(store.clone(), source, sink, config));

        Self {
            store,
            sync,
            identity: TokenIdentityProvider::new(config.tokens.clone()),
        }
    }
}
