// HTTP API: user login and event management

pub mod events;
pub mod users;

pub use events::create_event_router;
pub use users::create_user_router;

use crate::config::AppConfig;
use crate::event::{CodeGenerator, EventRegistry};
use crate::store::Store;
use crate::user::UserDirectory;
use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory>,
    pub events: Arc<EventRegistry>,
    /// When true, delete and attendee listing require the host's userId
    pub enforce_host_identity: bool,
}

impl AppState {
    /// Wire the services over `store` using the configured limits
    pub fn from_config(store: Arc<Store>, config: &AppConfig) -> Self {
        let codes = CodeGenerator::new(config.events.code_max_attempts);
        Self::new(store, codes, config.api.enforce_host_identity)
    }

    pub fn new(store: Arc<Store>, codes: CodeGenerator, enforce_host_identity: bool) -> Self {
        Self {
            users: Arc::new(UserDirectory::new(Arc::clone(&store))),
            events: Arc::new(EventRegistry::new(store, codes)),
            enforce_host_identity,
        }
    }
}

/// Error body shared by every endpoint
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Full application router: all API routes plus CORS and request tracing.
///
/// The browser front end is served from another origin, so any origin is allowed.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(create_user_router(state.clone()))
        .merge(create_event_router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
