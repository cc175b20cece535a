use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use civic_api::{AppState, cors_layer, router};
use civic_core::{LifecycleService, ListingConfig, Store};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(store: Store, expose_errors: bool) -> Router {
    let service = LifecycleService::new(store, ListingConfig::default());
    router(Arc::new(AppState::new(service, expose_errors)), cors_layer(&[]))
}

fn app() -> Router {
    app_with(Store::in_memory(), true)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create(app: &Router, title: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/issues",
        Some(json!({
            "title": title,
            "description": "Reported by a resident",
            "category": "Roads",
            "priority": "high",
            "location": {"address": "12 Main St", "ward": "Ward 7"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

#[tokio::test]
async fn test_health_reports_issue_count() {
    let app = app();
    create(&app, "Pothole").await;

    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["database"], "Connected");
    assert_eq!(body["collections"]["issues"], 1);
}

#[tokio::test]
async fn test_create_returns_external_shape() {
    let app = app();
    let issue = create(&app, "Pothole").await;

    assert_eq!(issue["status"], "Pending");
    assert_eq!(issue["priority"], "High");
    assert_eq!(issue["category"], "Roads");
    assert_eq!(issue["location"], "12 Main St");
    assert_eq!(issue["ward"], "Ward 7");
    assert_eq!(issue["type"], "text");
    assert_eq!(issue["reportedBy"], "Citizen");
    assert_eq!(issue["timeline"][0]["status"], "Pending");
    assert_eq!(issue["timeline"][0]["note"], "Issue created");
}

#[tokio::test]
async fn test_create_rejects_missing_fields() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/issues",
        Some(json!({"title": "   ", "location": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "Missing required fields: title, description, location.address"
    );
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/issues")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_transition_appends_timeline() {
    let app = app();
    let issue = create(&app, "Broken streetlight").await;
    let id = issue["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/issues/{id}/status"),
        Some(json!({"status": "In Progress", "note": "Crew dispatched"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Issue status updated successfully");
    assert_eq!(body["data"]["status"], "In Progress");
    assert!(body["data"]["resolvedAt"].is_null());

    let (_, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/issues/{id}/status"),
        Some(json!({"status": "Resolved"})),
    )
    .await;
    let timeline = body["data"]["timeline"].as_array().unwrap();
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[1]["note"], "Crew dispatched");
    assert_eq!(timeline[2]["status"], "Resolved");
    assert_eq!(timeline[2]["note"], "Status updated to Resolved");
    assert!(body["data"]["resolvedAt"].is_string());
}

#[tokio::test]
async fn test_status_errors() {
    let app = app();
    let issue = create(&app, "Graffiti").await;
    let id = issue["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/issues/{id}/status"),
        Some(json!({"status": "Done"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Invalid status 'Done'. Allowed values: Pending, In Progress, Resolved"
    );

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/issues/{id}/status"),
        Some(json!({"note": "no status"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::PATCH,
        "/api/issues/not-an-id/status",
        Some(json!({"status": "Resolved"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/issues/0123456789abcdefghjkmnpq/status",
        Some(json!({"status": "Resolved"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_get_issue() {
    let app = app();
    let issue = create(&app, "Fallen tree").await;
    let id = issue["id"].as_str().unwrap();

    let (status, body) = send(&app, Method::GET, &format!("/api/issues/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Fallen tree");
    assert!(body["data"]["timeline"].is_array());

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/issues/0123456789abcdefghjkmnpq",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters_and_paginates() {
    let app = app();
    for n in 0..3 {
        create(&app, &format!("Issue {n}")).await;
    }

    let (status, body) = send(&app, Method::GET, "/api/issues?limit=2&page=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["currentPage"], 2);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["totalItems"], 3);
    assert_eq!(body["pagination"]["itemsPerPage"], 2);
    assert!(body["data"][0].get("timeline").is_none());

    let (_, body) = send(&app, Method::GET, "/api/issues?status=Resolved", None).await;
    assert_eq!(body["pagination"]["totalItems"], 0);

    let (_, body) = send(&app, Method::GET, "/api/issues?status=All", None).await;
    assert_eq!(body["pagination"]["totalItems"], 3);

    let (status, _) = send(&app, Method::GET, "/api/issues?page=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search() {
    let app = app();
    create(&app, "Pothole on Elm").await;
    create(&app, "Noise complaint").await;

    let (status, body) = send(&app, Method::GET, "/api/issues/search?q=POTHOLE", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["title"], "Pothole on Elm");

    let (status, body) = send(&app, Method::GET, "/api/issues/search", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Search query is required");
}

#[tokio::test]
async fn test_stats() {
    let app = app();
    let (_, body) = send(&app, Method::GET, "/api/issues/stats", None).await;
    assert_eq!(body["data"]["totalIssues"], 0);
    assert_eq!(body["data"]["resolutionRate"], 0);

    let first = create(&app, "One").await;
    create(&app, "Two").await;
    let id = first["id"].as_str().unwrap();
    send(
        &app,
        Method::PATCH,
        &format!("/api/issues/{id}/status"),
        Some(json!({"status": "Resolved"})),
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/api/issues/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["totalIssues"], 2);
    assert_eq!(data["pendingIssues"], 1);
    assert_eq!(data["resolvedIssues"], 1);
    assert_eq!(data["resolutionRate"], "50.0");
    assert_eq!(data["categoryStats"][0]["_id"], "Roads");
    assert_eq!(data["categoryStats"][0]["count"], 2);
}

#[tokio::test]
async fn test_migrate_timeline_over_legacy_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.jsonl");
    std::fs::write(
        &path,
        concat!(
            r#"{"id":"0123456789abcdefghjkmnpq","title":"Old","description":"d","status":"closed"}"#,
            "\n",
            r#"{"id":"1123456789abcdefghjkmnpq","title":"Older","description":"d","status":"open","timeline":[{"status":"acknowledged"}]}"#,
            "\n",
        ),
    )
    .unwrap();
    let app = app_with(Store::open(&path).unwrap(), true);

    let (status, body) = send(&app, Method::POST, "/api/issues/migrate-timeline", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["updatedIssues"], 2);
    assert_eq!(body["totalIssues"], 2);

    let (_, body) = send(&app, Method::POST, "/api/issues/migrate-timeline", None).await;
    assert_eq!(body["updatedIssues"], 0);

    let (_, body) = send(&app, Method::GET, "/api/issues/0123456789abcdefghjkmnpq", None).await;
    assert_eq!(body["data"]["status"], "Resolved");
    assert_eq!(body["data"]["timeline"][0]["note"], "Initial status from migration");
}

#[tokio::test]
async fn test_listing_substitutes_placeholder_for_malformed_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("issues.jsonl");
    std::fs::write(
        &path,
        r#"{"id":"legacy-17","title":"Imported","description":"d","status":"Pending"}"#,
    )
    .unwrap();
    let app = app_with(Store::open(&path).unwrap(), false);

    let (status, body) = send(&app, Method::GET, "/api/issues", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], "legacy-17");
    assert_eq!(body["data"][0]["title"], "Error Loading Issue");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (status, _) = send(&app(), Method::GET, "/api/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
