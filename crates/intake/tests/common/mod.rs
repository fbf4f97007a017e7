//! Common test utilities.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use intake::flow::FlowEngine;
use intake::middleware::SessionMiddleware;
use intake::server::{self, AppState};
use intake::session::SequentialTokenMint;
use intake::store::Stores;

/// Build the router over `stores`, minting tokens `T1`, `T2`, ...
pub fn app_with(stores: Stores) -> Router {
    app_with_timeout(stores, 30)
}

pub fn app_with_timeout(stores: Stores, request_timeout_seconds: u64) -> Router {
    let engine = FlowEngine::new(Arc::new(SequentialTokenMint::new("T")));
    let sessions = SessionMiddleware::for_engine(stores, engine);
    server::build_app(AppState::new(sessions), request_timeout_seconds)
}

/// Create a test app backed by in-memory stores.
pub fn test_app() -> Router {
    app_with(Stores::in_memory())
}

/// POST one event and return the status and JSON body (`null` when empty).
pub async fn post_event(app: &Router, event: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/v1/events")
                .header("content-type", "application/json")
                .body(Body::from(event.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    if body.is_empty() {
        return (status, Value::Null);
    }
    (status, serde_json::from_slice(&body).unwrap())
}

pub fn text_event(message_id: &str, user: &str, text: &str) -> Value {
    json!({
        "type": "message_received",
        "message_id": message_id,
        "sender": { "id": user },
        "content": { "type": "text", "text": text }
    })
}

pub fn sticker_event(message_id: &str, user: &str) -> Value {
    json!({
        "type": "message_received",
        "message_id": message_id,
        "sender": { "id": user },
        "content": { "type": "sticker", "sticker_id": "CAAD" }
    })
}

pub fn callback_event(callback_id: &str, user: &str, data: &str) -> Value {
    json!({
        "type": "callback_query",
        "callback_query_id": callback_id,
        "sender": { "id": user },
        "data": data
    })
}

/// The `content` of every returned message.
pub fn contents(body: &Value) -> Vec<String> {
    body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect()
}

/// Callback data of the button labelled `label` in the last returned message.
pub fn button_data(body: &Value, label: &str) -> String {
    let last = body["messages"].as_array().unwrap().last().unwrap();
    last["inline_keyboard"]["rows"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|row| row.as_array().unwrap())
        .find(|button| button["text"] == label)
        .map(|button| button["callback_data"].as_str().unwrap().to_string())
        .unwrap()
}
