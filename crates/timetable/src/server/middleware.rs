use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::auth::Session;
use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// Resolves the bearer token once and stores the `Session` in the request
/// extensions for the handlers and guards below.
pub async fn resolve_session(
    State(s): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let session = s.identity.resolve(header);
    req.extensions_mut().insert(session);
    next.run(req).await
}

fn session_of(req: &Request) -> Session {
    req.extensions()
        .get::<Session>()
        .cloned()
        .unwrap_or(Session::Guest)
}

fn unauthorized() -> Response {
    ApiErrorType::from((StatusCode::UNAUTHORIZED, "Authentication required", None)).into_response()
}

/// Rejects guests.
pub async fn require_user(req: Request, next: Next) -> Response {
    match session_of(&req) {
        Session::Guest => unauthorized(),
        _ => next.run(req).await,
    }
}

/// Rejects everyone but administrators.
pub async fn require_admin(req: Request, next: Next) -> Response {
    match session_of(&req) {
        Session::Guest => unauthorized(),
        s if s.is_admin() => next.run(req).await,
        s => {
            warn!(user_id = ?s.user_id(), path = %req.uri().path(), "Admin endpoint refused");
            ApiErrorType::from((StatusCode::FORBIDDEN, "Administrator role required", None))
                .into_response()
        }
    }
}
