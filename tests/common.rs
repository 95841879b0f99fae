// Shared helpers for API integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use eventhub::api::{create_router, AppState};
use eventhub::event::CodeGenerator;
use eventhub::store::Store;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub fn create_test_app() -> Router {
    create_test_app_with(false)
}

pub fn create_test_app_with(enforce_host_identity: bool) -> Router {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let codes = CodeGenerator::with_rng(StdRng::seed_from_u64(2024), 32);
    create_router(AppState::new(store, codes, enforce_host_identity))
}

/// Send a request and return (status, parsed JSON body)
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Log in and return the user id
pub async fn login(app: &Router, email: &str) -> i64 {
    let (status, user) = send(app, "POST", "/api/users/login", Some(serde_json::json!({ "email": email }))).await;
    assert_eq!(status, StatusCode::OK);
    user["id"].as_i64().unwrap()
}

/// Create an online event and return its JSON
pub async fn create_event(app: &Router, user_id: i64, title: &str) -> Value {
    let (status, event) = send(
        app,
        "POST",
        "/api/events/create",
        Some(serde_json::json!({
            "userId": user_id,
            "title": title,
            "description": "test event",
            "isOnline": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    event
}
