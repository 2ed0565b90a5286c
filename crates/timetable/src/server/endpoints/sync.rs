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

use crate::sync::SyncStatus;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    /// Re-parse even if the file fingerprint is unchanged
    #[serde(default)]
    pub force: bool,
    /// Overrides the configured file filter for this run
    pub filter: Option<String>,
}

/// POST /sync
/// Runs the pipeline now and returns its report.
pub async fn post_sync(State(s): State<Arc<AppState>>, Query(query): Query<SyncQuery>) -> Response {
    info!("POST /sync (force={}, filter={:?})", query.force, query.filter);

    let report = match query.filter.as_deref() {
        Some(filter) => s.sync.run_with_filter(Some(filter), query.force).await,
        None => s.sync.run(query.force).await,
    };

    let status = match report.status {
        SyncStatus::Updated | SyncStatus::Unchanged => StatusCode::OK,
        SyncStatus::Stale => StatusCode::BAD_GATEWAY,
        SyncStatus::Failed => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report)).into_response()
}

/// GET /sync/status
/// Report of the last finished run, if any.
pub async fn get_sync_status(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /sync/status");

    let last = s.sync.last_report().await;
    (StatusCode::OK, Json(json!({ "lastRun": last }))).into_response()
}
