//! HTTP client for the civic REST API

use anyhow::{Context, Result, anyhow};
use civic_core::{ExternalIssue, IssueStats, ListParams, MigrationReport, NewIssue, PageInfo};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";

/// Client for one API base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

/// One page of issues
#[derive(Debug, Clone)]
pub struct IssuePage {
    pub issues: Vec<ExternalIssue>,
    pub pagination: PageInfo,
}

/// `/health` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub message: String,
    pub database: String,
    pub collections: HealthCollections,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCollections {
    pub issues: usize,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            token: None,
            http: reqwest::Client::new(),
        }
    }

    /// Copy of this client that authenticates with `token`
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            base_url: self.base_url.clone(),
            token: Some(token.into()),
            http: self.http.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn call(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach API at {}", self.base_url))?;
        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => Value::Null,
            Err(e) => return Err(e).context("API returned an unreadable response"),
        };

        if !status.is_success() || body.get("success") == Some(&Value::Bool(false)) {
            return Err(api_error(status, &body));
        }
        tracing::debug!(%status, "API call succeeded");
        Ok(body)
    }

    pub async fn list_issues(&self, params: &ListParams) -> Result<IssuePage> {
        let mut body = self
            .call(self.request(Method::GET, "issues").query(params))
            .await?;
        Ok(IssuePage {
            issues: take(&mut body, "data")?,
            pagination: take(&mut body, "pagination")?,
        })
    }

    pub async fn get_issue(&self, id: &str) -> Result<ExternalIssue> {
        let mut body = self
            .call(self.request(Method::GET, &format!("issues/{id}")))
            .await?;
        take(&mut body, "data")
    }

    pub async fn create_issue(&self, issue: &NewIssue) -> Result<ExternalIssue> {
        let mut body = self
            .call(self.request(Method::POST, "issues").json(issue))
            .await?;
        take(&mut body, "data")
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: &str,
        note: Option<&str>,
    ) -> Result<ExternalIssue> {
        let payload = json!({ "status": status, "note": note });
        let mut body = self
            .call(
                self.request(Method::PATCH, &format!("issues/{id}/status"))
                    .json(&payload),
            )
            .await?;
        take(&mut body, "data")
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<ExternalIssue>> {
        let mut params = vec![("q", query.to_string())];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let mut body = self
            .call(self.request(Method::GET, "issues/search").query(&params))
            .await?;
        take(&mut body, "data")
    }

    pub async fn stats(&self) -> Result<IssueStats> {
        let mut body = self.call(self.request(Method::GET, "issues/stats")).await?;
        take(&mut body, "data")
    }

    pub async fn migrate(&self) -> Result<MigrationReport> {
        let body = self
            .call(self.request(Method::POST, "issues/migrate-timeline"))
            .await?;
        serde_json::from_value(body).context("Unexpected migration response")
    }

    pub async fn health(&self) -> Result<Health> {
        let body = self.call(self.request(Method::GET, "health")).await?;
        serde_json::from_value(body).context("Unexpected health response")
    }
}

fn take<T: DeserializeOwned>(body: &mut Value, key: &str) -> Result<T> {
    let value = body.get_mut(key).map(Value::take).unwrap_or(Value::Null);
    serde_json::from_value(value).with_context(|| format!("Unexpected `{key}` in API response"))
}

/// Error from a `{success: false, message, error?}` body
fn api_error(status: StatusCode, body: &Value) -> anyhow::Error {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed"));
    match body.get("error").and_then(Value::as_str) {
        Some(detail) => anyhow!("{} ({}): {}", message, status.as_u16(), detail),
        None => anyhow!("{} ({})", message, status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_api::{AppState, cors_layer, router};
    use civic_core::{LifecycleService, ListingConfig, Location, Status, Store};
    use std::sync::Arc;

    async fn spawn_api() -> ApiClient {
        let service = LifecycleService::new(Store::in_memory(), ListingConfig::default());
        let app = router(Arc::new(AppState::new(service, true)), cors_layer(&[]));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ApiClient::new(format!("http://{addr}/api/"))
    }

    fn pothole() -> NewIssue {
        NewIssue {
            title: Some("Pothole".into()),
            description: Some("Deep pothole by the school".into()),
            location: Some(Location::new("4 School Rd")),
            ..Default::default()
        }
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:5000/api/");
        assert_eq!(client.base_url(), "http://localhost:5000/api");
        assert_eq!(client.url("issues"), "http://localhost:5000/api/issues");
        assert_eq!(client.url("/health"), "http://localhost:5000/api/health");
    }

    #[test]
    fn test_with_token_keeps_original() {
        let client = ApiClient::new(DEFAULT_API_URL);
        assert!(client.token.is_none());
        let authed = client.with_token("secret");
        assert_eq!(authed.token.as_deref(), Some("secret"));
        assert!(client.token.is_none());
        assert_eq!(authed.base_url(), client.base_url());
    }

    #[test]
    fn test_api_error_message() {
        let body = json!({"success": false, "message": "Issue not found: x"});
        let err = api_error(StatusCode::NOT_FOUND, &body);
        assert_eq!(err.to_string(), "Issue not found: x (404)");

        let body = json!({
            "success": false,
            "message": "Error creating issue",
            "error": "disk full"
        });
        let err = api_error(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert_eq!(err.to_string(), "Error creating issue (500): disk full");

        let err = api_error(StatusCode::BAD_GATEWAY, &Value::Null);
        assert_eq!(err.to_string(), "Bad Gateway (502)");
    }

    #[tokio::test]
    async fn test_round_trip_against_server() {
        let client = spawn_api().await;

        let health = client.health().await.unwrap();
        assert_eq!(health.status, "OK");
        assert_eq!(health.collections.issues, 0);

        let created = client.create_issue(&pothole()).await.unwrap();
        assert_eq!(created.status, Status::Pending);

        let updated = client
            .update_status(&created.id, "in progress", Some("Crew on site"))
            .await
            .unwrap();
        assert_eq!(updated.status, Status::InProgress);
        let timeline = updated.timeline.unwrap();
        assert_eq!(timeline.last().unwrap().note, "Crew on site");

        let page = client.list_issues(&ListParams::default()).await.unwrap();
        assert_eq!(page.pagination.total_items, 1);

        let found = client.search("school", None).await.unwrap();
        assert_eq!(found.len(), 1);

        let stats = client.stats().await.unwrap();
        assert_eq!(stats.in_progress_issues, 1);

        let report = client.migrate().await.unwrap();
        assert_eq!(report.updated_issues, 0);
        assert_eq!(report.total_issues, 1);
    }

    #[tokio::test]
    async fn test_server_errors_surface_message() {
        let client = spawn_api().await;
        let err = client
            .get_issue("0123456789abcdefghjkmnpq")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("(404)"), "{err}");

        let err = client.create_issue(&NewIssue::default()).await.unwrap_err();
        assert!(
            err.to_string().starts_with("Missing required fields"),
            "{err}"
        );
    }
}
