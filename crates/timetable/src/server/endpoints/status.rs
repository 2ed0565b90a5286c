use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::server::types::ApiErrorType;
use crate::types::AppState;

const DEFAULT_NOTIFICATION_LIMIT: usize = 20;
const MAX_NOTIFICATION_LIMIT: usize = 200;

/// GET /health
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    let active = s.store.active_id();
    let database_ok = active.is_ok();
    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database_ok { "ok" } else { "degraded" },
            "activeScheduleId": active.ok().flatten(),
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    pub limit: Option<usize>,
}

/// GET /notifications
pub async fn get_notifications(
    State(s): State<Arc<AppState>>,
    Query(query): Query<NotificationsQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
        .clamp(1, MAX_NOTIFICATION_LIMIT);
    info!("GET /notifications (limit={})", limit);

    match s.store.recent_notifications(limit) {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
