mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use timetable::server::create_router;

use common::{math_workbook, state, FakeSource};

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_and_empty_schedule() {
    let app = create_router(state(FakeSource::with_bytes(math_workbook("102"))));

    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, "GET", "/schedule", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "no data available");

    let (status, _) = send(&app, "GET", "/changes/latest", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sync_requires_admin() {
    let app = create_router(state(FakeSource::with_bytes(math_workbook("102"))));

    let (status, _) = send(&app, "POST", "/sync", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "POST", "/sync", Some("student"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", "/sync", Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "updated");
    assert_eq!(body["summary"]["counts"]["added"], 2);

    let (status, body) = send(&app, "GET", "/sync/status", Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lastRun"]["status"], "updated");
}

#[tokio::test]
async fn schedule_and_changes_after_update() {
    let source = FakeSource::with_bytes(math_workbook("102"));
    let app_state = state(source.clone());
    let app = create_router(app_state.clone());

    send(&app, "POST", "/sync", Some("admin"), None).await;
    source.set_bytes(math_workbook("103"));
    send(&app, "POST", "/sync", Some("admin"), None).await;

    let (status, body) = send(&app, "GET", "/schedule?group=DS1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stale"], false);
    assert_eq!(body["sections"][0]["entries"].as_array().unwrap().len(), 2);
    assert_eq!(body["sections"][0]["entries"][1]["classInfo"]["room"], "103");

    let (status, body) = send(&app, "GET", "/changes/latest?full=true", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["modified"], 1);
    assert_eq!(body["changes"][0]["fieldName"], "room");

    let schedules = app_state.store.list_schedules().unwrap();
    let (active, old) = (schedules[0].id, schedules[1].id);

    let (status, body) = send(&app, "GET", &format!("/schedules/{}/changes", old), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["added"], 2);
    assert!(body.get("changes").is_none());

    let (status, _) = send(&app, "DELETE", &format!("/schedules/{}", active), Some("admin"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "DELETE", &format!("/schedules/{}", old), Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", &format!("/schedules/{}/changes", old), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/notifications", Some("student"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/notifications", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_flag_after_failed_sync() {
    let source = FakeSource::with_bytes(math_workbook("102"));
    let app = create_router(state(source.clone()));

    send(&app, "POST", "/sync", Some("admin"), None).await;
    source.fail();
    let (status, body) = send(&app, "POST", "/sync", Some("admin"), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "stale");

    let (status, body) = send(&app, "GET", "/schedule", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stale"], true);
}

#[tokio::test]
async fn directory_and_candidates() {
    let app = create_router(state(FakeSource::with_bytes(math_workbook("102"))));
    send(&app, "POST", "/sync", Some("admin"), None).await;

    let (status, body) = send(&app, "GET", "/candidates", Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instructors"][0]["value"], "JK");
    assert_eq!(body["instructors"][0]["occurrences"], 2);
    assert_eq!(body["subjects"][0]["value"], "Matematyka");

    let (status, instructor) = send(
        &app,
        "POST",
        "/instructors",
        Some("admin"),
        Some(json!({ "name": "Jan Kowalski", "aliases": ["JK"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let instructor_id = instructor["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/instructors",
        Some("admin"),
        Some(json!({ "name": "Jan Kowalski" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, subject) = send(
        &app,
        "POST",
        "/subjects",
        Some("admin"),
        Some(json!({ "name": "Matematyka" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let subject_id = subject["id"].as_i64().unwrap();

    let (_, body) = send(&app, "GET", "/candidates", Some("admin"), None).await;
    assert!(body["instructors"].as_array().unwrap().is_empty());
    assert!(body["subjects"].as_array().unwrap().is_empty());
    assert_eq!(body["missingLinks"][0]["subjectId"], subject_id);

    let uri = format!("/instructors/{}/link_proposals", instructor_id);
    let (status, body) = send(&app, "GET", &uri, Some("admin"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["subject"], "Matematyka");
    assert_eq!(body[0]["alreadyLinked"], false);

    let uri = format!("/instructors/{}/links", instructor_id);
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some("admin"),
        Some(json!({ "subjectIds": [subject_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["linked"], json!([subject_id]));

    let (_, body) = send(&app, "GET", "/candidates", Some("admin"), None).await;
    assert!(body["missingLinks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ignored_candidates_disappear() {
    let app = create_router(state(FakeSource::with_bytes(math_workbook("102"))));
    send(&app, "POST", "/sync", Some("admin"), None).await;

    let (status, _) = send(
        &app,
        "POST",
        "/candidates/ignore",
        Some("admin"),
        Some(json!({ "kind": "instructor", "value": "JK", "reason": "placeholder" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, "GET", "/candidates", Some("admin"), None).await;
    assert!(body["instructors"].as_array().unwrap().is_empty());
    assert_eq!(body["subjects"].as_array().unwrap().len(), 1);
}
