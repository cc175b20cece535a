//! Route handlers

use crate::{ApiError, AppState};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use civic_core::{ExternalIssue, ListParams, MigrationReport, NewIssue, PageInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Shared = State<Arc<AppState>>;

/// API response wrapper
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    fn with_message(data: T, message: &'static str) -> Self {
        Self {
            success: true,
            data,
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
struct ListResponse {
    success: bool,
    data: Vec<ExternalIssue>,
    pagination: PageInfo,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    success: bool,
    data: Vec<ExternalIssue>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct MigrationResponse {
    success: bool,
    #[serde(flatten)]
    report: MigrationReport,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    database: &'static str,
    collections: Collections,
}

#[derive(Debug, Serialize)]
struct Collections {
    issues: usize,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/issues", get(list_issues).post(create_issue))
        .route("/issues/stats", get(stats))
        .route("/issues/search", get(search_issues))
        .route("/issues/migrate-timeline", post(migrate_timeline))
        .route("/issues/{id}", get(get_issue))
        .route("/issues/{id}/status", patch(update_status))
}

fn query_error(state: &AppState, rejection: QueryRejection) -> ApiError {
    ApiError::bad_request("Invalid query parameters", rejection.body_text(), state.expose_errors)
}

fn body_error(state: &AppState, rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("Invalid request body", rejection.body_text(), state.expose_errors)
}

async fn health(State(state): Shared) -> Result<impl IntoResponse, ApiError> {
    let issues = state
        .service
        .issue_count()
        .await
        .map_err(state.fail("Health check failed"))?;
    Ok(Json(HealthResponse {
        status: "OK",
        message: "Server is running",
        database: "Connected",
        collections: Collections { issues },
    }))
}

async fn list_issues(
    State(state): Shared,
    query: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = query.map_err(|r| query_error(&state, r))?;
    let list = state
        .service
        .list_issues(&params)
        .await
        .map_err(state.fail("Error fetching issues"))?;
    Ok(Json(ListResponse {
        success: true,
        data: list.issues,
        pagination: list.pagination,
    }))
}

async fn stats(State(state): Shared) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .service
        .stats()
        .await
        .map_err(state.fail("Error fetching statistics"))?;
    Ok(Json(ApiResponse::ok(stats)))
}

async fn search_issues(
    State(state): Shared,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|r| query_error(&state, r))?;
    let issues = state
        .service
        .search_issues(query.q.as_deref().unwrap_or_default(), query.limit)
        .await
        .map_err(state.fail("Error searching issues"))?;
    Ok(Json(SearchResponse {
        success: true,
        count: issues.len(),
        data: issues,
    }))
}

async fn get_issue(
    State(state): Shared,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = state
        .service
        .get_issue(&id)
        .await
        .map_err(state.fail("Error fetching issue"))?;
    Ok(Json(ApiResponse::ok(issue)))
}

async fn create_issue(
    State(state): Shared,
    body: Result<Json<NewIssue>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|r| body_error(&state, r))?;
    let issue = state
        .service
        .create_issue(request)
        .await
        .map_err(state.fail("Error creating issue"))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(issue))))
}

async fn update_status(
    State(state): Shared,
    Path(id): Path<String>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|r| body_error(&state, r))?;
    let issue = state
        .service
        .apply_status_change(
            &id,
            request.status.as_deref().unwrap_or_default(),
            request.note,
        )
        .await
        .map_err(state.fail("Error updating issue status"))?;
    Ok(Json(ApiResponse::with_message(
        issue,
        "Issue status updated successfully",
    )))
}

async fn migrate_timeline(State(state): Shared) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .service
        .migrate_legacy_statuses()
        .await
        .map_err(state.fail("Error migrating timeline data"))?;
    Ok(Json(MigrationResponse {
        success: true,
        report,
    }))
}
