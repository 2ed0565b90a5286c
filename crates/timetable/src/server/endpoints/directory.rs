//! Admin endpoints for the instructor/subject directory and the candidate
//! review queue.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::db::StoreError;
use crate::matcher::{
    detect_instructor_candidates, detect_missing_links, detect_subject_candidates, propose_links,
    CandidateKind,
};
use crate::server::types::ApiErrorType;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct NewNameRequest {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AliasesRequest {
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub subject_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct IgnoreRequest {
    pub kind: CandidateKind,
    pub value: String,
    #[serde(default)]
    pub context: String,
    pub reason: Option<String>,
}

fn bad_request(message: &str) -> Response {
    ApiErrorType::from((StatusCode::BAD_REQUEST, message, None)).into_response()
}

fn task_failed(e: tokio::task::JoinError) -> Response {
    error!("Candidate scan task failed: {}", e);
    ApiErrorType::from((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Candidate scan failed",
        Some(e.to_string()),
    ))
    .into_response()
}

/// GET /instructors
pub async fn get_instructors(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /instructors");

    match s.store.list_instructors() {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// POST /instructors
pub async fn post_instructor(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewNameRequest>,
) -> Response {
    info!("POST /instructors ({})", body.name);

    if body.name.trim().is_empty() {
        return bad_request("Name must not be empty");
    }
    match s.store.add_instructor(&body.name, &body.aliases) {
        Ok(instructor) => (StatusCode::CREATED, Json(instructor)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// PUT /instructors/:id/aliases
pub async fn put_instructor_aliases(
    Path(id): Path<i64>,
    State(s): State<Arc<AppState>>,
    Json(body): Json<AliasesRequest>,
) -> Response {
    info!("PUT /instructors/{}/aliases", id);

    match s.store.set_instructor_aliases(id, &body.aliases) {
        Ok(instructor) => (StatusCode::OK, Json(instructor)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// GET /instructors/:id/link_proposals
/// Subjects the instructor appears to teach in the active timetable.
pub async fn get_link_proposals(Path(id): Path<i64>, State(s): State<Arc<AppState>>) -> Response {
    info!("GET /instructors/{}/link_proposals", id);

    let store = s.store.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
        let instructor = store.get_instructor(id)?;
        let Some(schedule) = store.load()? else {
            return Ok(Vec::new());
        };
        let index = store.directory_index()?;
        let links = store.subject_instructor_links()?;
        Ok(propose_links(&schedule, &instructor, &index, &links))
    })
    .await;

    match result {
        Ok(Ok(proposals)) => (StatusCode::OK, Json(proposals)).into_response(),
        Ok(Err(e)) => ApiErrorType::from(e).into_response(),
        Err(e) => task_failed(e),
    }
}

/// POST /instructors/:id/links
/// Confirms subject links for an instructor.
pub async fn post_instructor_links(
    Path(id): Path<i64>,
    State(s): State<Arc<AppState>>,
    Json(body): Json<LinkRequest>,
) -> Response {
    info!("POST /instructors/{}/links ({:?})", id, body.subject_ids);

    let mut linked = Vec::new();
    let mut already_linked = Vec::new();
    for subject_id in body.subject_ids {
        match s.store.link_subject_instructor(subject_id, id) {
            Ok(true) => linked.push(subject_id),
            Ok(false) => already_linked.push(subject_id),
            Err(e) => return ApiErrorType::from(e).into_response(),
        }
    }

    (
        StatusCode::OK,
        Json(json!({ "linked": linked, "alreadyLinked": already_linked })),
    )
        .into_response()
}

/// GET /subjects
pub async fn get_subjects(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /subjects");

    match s.store.list_subjects() {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// POST /subjects
pub async fn post_subject(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewNameRequest>,
) -> Response {
    info!("POST /subjects ({})", body.name);

    if body.name.trim().is_empty() {
        return bad_request("Name must not be empty");
    }
    match s.store.add_subject(&body.name, &body.aliases) {
        Ok(subject) => (StatusCode::CREATED, Json(subject)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// PUT /subjects/:id/aliases
pub async fn put_subject_aliases(
    Path(id): Path<i64>,
    State(s): State<Arc<AppState>>,
    Json(body): Json<AliasesRequest>,
) -> Response {
    info!("PUT /subjects/{}/aliases", id);

    match s.store.set_subject_aliases(id, &body.aliases) {
        Ok(subject) => (StatusCode::OK, Json(subject)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}

/// GET /candidates
/// Unresolved instructor and subject names plus missing subject links, from
/// three independent scans of the active snapshot.
pub async fn get_candidates(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /candidates");

    let store = s.store.clone();
    let loaded = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
        Ok((
            store.load()?,
            store.directory_index()?,
            store.list_candidate_ignores()?,
            store.subject_instructor_links()?,
        ))
    })
    .await;

    let (schedule, index, ignores, links) = match loaded {
        Ok(Ok((Some(schedule), index, ignores, links))) => (
            Arc::new(schedule),
            Arc::new(index),
            Arc::new(ignores),
            Arc::new(links),
        ),
        Ok(Ok((None, ..))) => {
            return (
                StatusCode::OK,
                Json(json!({ "instructors": [], "subjects": [], "missingLinks": [] })),
            )
                .into_response()
        }
        Ok(Err(e)) => return ApiErrorType::from(e).into_response(),
        Err(e) => return task_failed(e),
    };

    let instructors = tokio::task::spawn_blocking({
        let (schedule, index, ignores) = (schedule.clone(), index.clone(), ignores.clone());
        move || detect_instructor_candidates(&schedule, &index, &ignores)
    });
    let subjects = tokio::task::spawn_blocking({
        let (schedule, index, ignores) = (schedule.clone(), index.clone(), ignores.clone());
        move || detect_subject_candidates(&schedule, &index, &ignores)
    });
    let missing = tokio::task::spawn_blocking(move || detect_missing_links(&schedule, &index, &links));

    match tokio::try_join!(instructors, subjects, missing) {
        Ok((instructors, subjects, missing)) => (
            StatusCode::OK,
            Json(json!({
                "instructors": instructors,
                "subjects": subjects,
                "missingLinks": missing,
            })),
        )
            .into_response(),
        Err(e) => task_failed(e),
    }
}

/// POST /candidates/ignore
/// Stops suggesting a value, either everywhere or in one context.
pub async fn post_candidate_ignore(
    State(s): State<Arc<AppState>>,
    Json(body): Json<IgnoreRequest>,
) -> Response {
    info!(
        "POST /candidates/ignore ({} '{}' in '{}')",
        body.kind.as_str(),
        body.value,
        body.context
    );

    if body.value.trim().is_empty() {
        return bad_request("Value must not be empty");
    }
    match s
        .store
        .add_candidate_ignore(body.kind, &body.value, &body.context, body.reason.as_deref())
    {
        Ok(ignore) => (StatusCode::CREATED, Json(ignore)).into_response(),
        Err(e) => ApiErrorType::from(e).into_response(),
    }
}
