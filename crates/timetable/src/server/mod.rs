use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::{middleware as mw, Router};

use crate::server::endpoints::{changes, directory, schedule, status, sync};
use crate::server::middleware::*;
use crate::types::AppState;

mod endpoints;
mod middleware;
mod types;

pub use endpoints::schedule::ScheduleFilter;
pub use types::ApiErrorType;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Administrator-only endpoints
    let admin_router = Router::new()
        .route("/schedules", get(schedule::get_schedules))
        .route("/schedules/:id", delete(schedule::delete_schedule))
        .route("/sync", post(sync::post_sync))
        .route("/sync/status", get(sync::get_sync_status))
        .route("/candidates", get(directory::get_candidates))
        .route("/candidates/ignore", post(directory::post_candidate_ignore))
        .route(
            "/instructors",
            get(directory::get_instructors).post(directory::post_instructor),
        )
        .route(
            "/instructors/:id/aliases",
            put(directory::put_instructor_aliases),
        )
        .route(
            "/instructors/:id/link_proposals",
            get(directory::get_link_proposals),
        )
        .route(
            "/instructors/:id/links",
            post(directory::post_instructor_links),
        )
        .route(
            "/subjects",
            get(directory::get_subjects).post(directory::post_subject),
        )
        .route("/subjects/:id/aliases", put(directory::put_subject_aliases))
        .layer(mw::from_fn(require_admin));

    // Endpoints for any signed-in user
    let user_router = Router::new()
        .route("/notifications", get(status::get_notifications))
        .layer(mw::from_fn(require_user));

    Router::new()
        .route("/health", get(status::get_health))
        .route("/schedule", get(schedule::get_schedule))
        .route("/schedules/:id/changes", get(changes::get_schedule_changes))
        .route("/changes/latest", get(changes::get_latest_changes))
        .merge(admin_router)
        .merge(user_router)
        .layer(mw::from_fn_with_state(
            app_state.clone(),
            resolve_session,
        ))
        .with_state(app_state)
}
