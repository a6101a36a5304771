// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end tests driving the full router over HTTP requests.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use messaging_rust_server::{
    api::router, providers::ExpoPushClient, state::AppState, storage::Database,
};
use serde_json::{json, Value};
use sha2::Sha256;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXPO_PATH: &str = "/--/api/v2/push/send";

fn test_state() -> (AppState, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let db = Database::open(&dir.path().join("api.redb")).expect("open db");
    (AppState::new(db), dir)
}

/// Unsigned token accepted in development mode.
fn token(subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(
        format!(r#"{{"sub":"{subject}","exp":4102444800,"iss":"test","sid":"sess_1"}}"#)
            .as_bytes(),
    );
    format!("{header}.{claims}.fake_signature")
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    subject: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(subject) = subject {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(subject)));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn onboarding_body(xmtp_id: &str, installation_id: &str, username: &str) -> Value {
    json!({
        "device": {
            "name": "Pixel",
            "os": "android",
            "expoToken": format!("ExponentPushToken[{xmtp_id}]")
        },
        "identity": {
            "walletAddress": "0xAbC0000000000000000000000000000000000001",
            "xmtpId": xmtp_id,
            "xmtpInstallationId": installation_id
        },
        "profile": { "name": "Alice", "username": username }
    })
}

async fn onboard(app: &Router, subject: &str, xmtp_id: &str, installation_id: &str, username: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/users",
        Some(subject),
        Some(onboarding_body(xmtp_id, installation_id, username)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "onboarding failed: {body}");
    body
}

#[tokio::test]
async fn onboarding_then_me() {
    let (state, _dir) = test_state();
    let app = router(state);

    let created = onboard(&app, "tk_alice", "xmtp-alice", "inst-alice", "Alice").await;
    assert_eq!(created["turnkeyUserId"], "tk_alice");
    assert_eq!(created["identity"]["walletAddress"], "0xabc0000000000000000000000000000000000001");
    assert_eq!(created["profile"]["username"], "alice");

    let (status, me) = send(&app, Method::GET, "/api/v1/users/me", Some("tk_alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], created["id"]);
    assert_eq!(me["devices"].as_array().unwrap().len(), 1);
    assert_eq!(me["identities"][0]["xmtpId"], "xmtp-alice");
    assert_eq!(me["identities"][0]["profile"]["username"], "alice");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/users",
        Some("tk_alice"),
        Some(onboarding_body("xmtp-alice-2", "inst-alice-2", "alice2")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn missing_token_is_unauthorized_and_unknown_user_forbidden() {
    let (state, _dir) = test_state();
    let app = router(state);

    let (status, body) = send(&app, Method::GET, "/api/v1/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, Method::GET, "/api/v1/users/me", Some("tk_nobody"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn devices_of_another_user_are_forbidden() {
    let (state, _dir) = test_state();
    let app = router(state);
    let alice = onboard(&app, "tk_alice", "xmtp-alice", "inst-alice", "alice").await;
    onboard(&app, "tk_bob", "xmtp-bob", "inst-bob", "bob").await;

    let uri = format!("/api/v1/devices/{}", alice["id"].as_str().unwrap());
    let (status, devices) = send(&app, Method::GET, &uri, Some("tk_alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(devices.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::GET, &uri, Some("tk_bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn profile_update_is_publicly_readable() {
    let (state, _dir) = test_state();
    let app = router(state);
    onboard(&app, "tk_alice", "xmtp-alice", "inst-alice", "alice").await;
    onboard(&app, "tk_bob", "xmtp-bob", "inst-bob", "bob").await;

    let (status, updated) = send(
        &app,
        Method::PUT,
        "/api/v1/profiles/xmtp-alice",
        Some("tk_alice"),
        Some(json!({ "name": "Alice A.", "username": "alice_a", "description": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{updated}");

    let (status, profile) =
        send(&app, Method::GET, "/api/v1/profiles/xmtp-alice", Some("tk_bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["xmtpId"], "xmtp-alice");
    assert_eq!(profile["username"], "alice_a");
    assert_eq!(profile["description"], "hi");

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/profiles/xmtp-alice",
        Some("tk_bob"),
        Some(json!({ "name": "Mallory", "username": "mallory" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, check) =
        send(&app, Method::GET, "/api/v1/profiles/check/Alice_A", Some("tk_bob"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["available"], false);
}

#[tokio::test]
async fn invalid_bodies_are_bad_requests() {
    let (state, _dir) = test_state();
    let app = router(state);
    onboard(&app, "tk_alice", "xmtp-alice", "inst-alice", "alice").await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/profiles/xmtp-alice",
        Some("tk_alice"),
        Some(json!({ "name": "Alice", "username": "no spaces allowed" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Validation failed"));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/users",
        Some("tk_carol"),
        Some(json!({ "device": { "os": "blackberry" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_relays_to_expo_and_dedupes() {
    let expo = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EXPO_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": [{ "status": "ok", "id": "ticket-7" }] })),
        )
        .expect(1)
        .mount(&expo)
        .await;

    let (state, _dir) = test_state();
    let state = state
        .with_push(ExpoPushClient::new(format!("{}{EXPO_PATH}", expo.uri()), None).unwrap())
        .with_webhook_secret("shh");
    let app = router(state);
    onboard(&app, "tk_alice", "xmtp-alice", "inst-alice", "alice").await;

    let payload = json!({
        "idempotencyKey": "evt-1",
        "message": {
            "contentTopic": "/xmtp/mls/1/g-abc/proto",
            "timestampNs": 1700000000000000000u64,
            "message": "ZW5jcnlwdGVk"
        },
        "messageContext": { "messageType": "application", "shouldPush": true },
        "installation": { "id": "inst-alice" },
        "subscription": { "topic": "/xmtp/mls/1/g-abc/proto", "isSilent": false }
    })
    .to_string();
    let mut mac = Hmac::<Sha256>::new_from_slice(b"shh").unwrap();
    mac.update(payload.as_bytes());
    let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    let webhook = |signature: Option<String>| {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/notifications/xmtp")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-signature", signature);
        }
        builder.body(Body::from(payload.clone())).unwrap()
    };

    let unsigned = app.clone().oneshot(webhook(None)).await.unwrap();
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

    for expected in ["delivered", "duplicate"] {
        let response = app.clone().oneshot(webhook(Some(signature.clone()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], expected);
    }

    let sent = expo.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&sent[0].body).unwrap();
    assert_eq!(body[0]["to"], "ExponentPushToken[xmtp-alice]");
    assert_eq!(body[0]["data"]["timestampNs"], "1700000000000000000");
    expo.verify().await;
}

#[tokio::test]
async fn deleting_the_user_removes_everything() {
    let (state, _dir) = test_state();
    let app = router(state);
    onboard(&app, "tk_alice", "xmtp-alice", "inst-alice", "alice").await;

    let (status, _) = send(&app, Method::DELETE, "/api/v1/users/me", Some("tk_alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/v1/users/me", Some("tk_alice"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        send(&app, Method::GET, "/api/v1/profiles/xmtp-alice", Some("tk_bob"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let (state, _dir) = test_state();
    let app = router(state);

    let (status, body) = send(&app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, doc) = send(&app, Method::GET, "/api-doc/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/users"].is_object());
}
