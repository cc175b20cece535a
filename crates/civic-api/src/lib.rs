//! civic-api: REST API for the civic issue tracker
//!
//! Thin HTTP layer over [`civic_core::LifecycleService`]. Routes are mounted
//! under `/api`.

pub mod error;
pub mod routes;

use axum::Router;
use axum::http::HeaderValue;
use civic_core::LifecycleService;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared application state
pub struct AppState {
    pub service: LifecycleService,
    /// Include diagnostic detail in 5xx bodies (off in production)
    pub expose_errors: bool,
}

impl AppState {
    pub fn new(service: LifecycleService, expose_errors: bool) -> Self {
        Self {
            service,
            expose_errors,
        }
    }

    /// Error mapper for a handler, reporting server faults under `context`
    pub fn fail<'a>(&'a self, context: &'a str) -> impl Fn(civic_core::Error) -> ApiError + 'a {
        move |err| ApiError::from_core(err, context, self.expose_errors)
    }
}

/// CORS for the configured origins; any origin when none are listed
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

/// Full application router
pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .nest("/api", routes::api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
