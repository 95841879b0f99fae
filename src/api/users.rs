use super::{AppState, ErrorResponse};
use crate::user::User;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Request to log in (or sign up) by email
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
}

/// Create user API router
pub fn create_user_router(state: AppState) -> Router {
    Router::new()
        .route("/api/users/login", post(login))
        .with_state(Arc::new(state))
}

/// POST /api/users/login - Look up or create the user for an email
async fn login(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<User>, UserApiError> {
    let request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| UserApiError::InvalidBody(e.to_string()))?;

    let email = request
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or(UserApiError::EmailRequired)?;

    let user = state.users.login_or_register(&email).map_err(|e| {
        error!(error = ?e, "Login failed");
        UserApiError::LoginFailed
    })?;

    info!(user_id = %user.id, "User logged in");
    Ok(Json(user))
}

/// User API error types
#[derive(Debug)]
enum UserApiError {
    InvalidBody(String),
    EmailRequired,
    LoginFailed,
}

impl IntoResponse for UserApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            UserApiError::InvalidBody(detail) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid request body: {}", detail),
            ),
            UserApiError::EmailRequired => {
                (StatusCode::BAD_REQUEST, "Email is required".to_string())
            }
            UserApiError::LoginFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}
