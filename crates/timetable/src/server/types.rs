use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::StoreError;

/// JSON error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiErrorType {
    #[serde(skip)]
    status: StatusCode,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl ApiErrorType {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<(StatusCode, &str, Option<String>)> for ApiErrorType {
    fn from((status, error, context): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status,
            error: error.to_string(),
            context,
        }
    }
}

impl From<StoreError> for ApiErrorType {
    fn from(err: StoreError) -> Self {
        let (status, message) = match &err {
            StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found"),
            StoreError::ActiveSchedule { .. } => {
                (StatusCode::CONFLICT, "The active schedule can't be deleted")
            }
            StoreError::Conflict(_) => (StatusCode::CONFLICT, "Already exists"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };
        Self::from((status, message, Some(err.to_string())))
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
