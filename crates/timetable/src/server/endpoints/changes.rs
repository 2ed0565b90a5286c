use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::report::ChangeSummary;
use crate::server::types::ApiErrorType;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    /// Include the individual change rows, not just the counts
    #[serde(default)]
    pub full: bool,
}

/// GET /schedules/:id/changes
pub async fn get_schedule_changes(
    Path(id): Path<i64>,
    State(s): State<Arc<AppState>>,
    Query(query): Query<ChangesQuery>,
) -> Response {
    info!("GET /schedules/{}/changes (full={})", id, query.full);

    match s.store.changes_for(id) {
        Ok(changes) => (
            StatusCode::OK,
            Json(ChangeSummary::from_changes(id, &changes, query.full)),
        )
            .into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// GET /changes/latest
/// Changes that produced the active snapshot.
pub async fn get_latest_changes(
    State(s): State<Arc<AppState>>,
    Query(query): Query<ChangesQuery>,
) -> Response {
    info!("GET /changes/latest (full={})", query.full);

    match s.store.latest_changes() {
        Ok(Some((id, changes))) => (
            StatusCode::OK,
            Json(ChangeSummary::from_changes(id, &changes, query.full)),
        )
            .into_response(),
        Ok(None) => ApiErrorType::from((
            StatusCode::NOT_FOUND,
            "No schedule has been saved yet",
            None,
        ))
        .into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
