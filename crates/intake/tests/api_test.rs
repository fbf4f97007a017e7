//! Integration tests for the HTTP API.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

mod common;

use common::{callback_event, contents, post_event, sticker_event, test_app, text_event};
use intake::flow::messages;

// ============================================================================
// Health Endpoints
// ============================================================================

#[tokio::test]
async fn test_livez() {
    let app = test_app();

    let response = app
        .oneshot(Request::get("/livez").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_readyz_reports_store() {
    let app = test_app();

    let response = app
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "memory");
}

#[tokio::test]
async fn test_version() {
    let app = test_app();

    let response = app
        .oneshot(Request::get("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["version"], intake::build_info::VERSION);
    assert!(json.get("commit").is_some());
    assert!(json.get("build_date").is_some());
}

// ============================================================================
// Events API
// ============================================================================

#[tokio::test]
async fn test_first_message_prompts_for_name() {
    let app = test_app();

    let (status, body) = post_event(&app, text_event("m1", "U1", "hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "handled");
    assert_eq!(body["completed"], false);
    assert_eq!(contents(&body), vec!["Please enter your name."]);
    assert_eq!(body["messages"][0]["type"], "text");
}

#[tokio::test]
async fn test_redelivered_event_is_reported_as_duplicate() {
    let app = test_app();

    post_event(&app, text_event("m1", "U1", "hello")).await;
    let (status, body) = post_event(&app, text_event("m1", "U1", "hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");
    assert!(body["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_sticker_gets_advisory() {
    let app = test_app();

    let (status, body) = post_event(&app, sticker_event("m1", "U1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents(&body), vec![messages::UNSUPPORTED_INPUT]);
}

#[tokio::test]
async fn test_unrecognized_content_type_gets_advisory() {
    let app = test_app();
    let event = serde_json::json!({
        "type": "message_received",
        "message_id": "m1",
        "sender": { "id": "U1" },
        "content": { "type": "video", "url": "https://example.invalid/v.mp4" }
    });

    let (status, body) = post_event(&app, event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents(&body), vec![messages::UNSUPPORTED_INPUT]);
}

#[tokio::test]
async fn test_forged_callback_is_rejected() {
    let app = test_app();

    let (status, body) = post_event(
        &app,
        callback_event("c1", "U1", "token=guess&field=name&answer=yes"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "handled");
    assert_eq!(contents(&body), vec![messages::INVALID_OPERATION]);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::post("/api/v1/events")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"type":"carrier_pigeon"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = test_app();

    let response = app
        .oneshot(Request::get("/api/v1/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
