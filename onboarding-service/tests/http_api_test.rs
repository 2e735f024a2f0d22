mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{body_json, json_request, TestApp};
use onboarding_service::events::{EventConsumer, MemoryChannel};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

fn signup(email: &str) -> Request<Body> {
    json_request(
        "POST",
        "/api/v1/users",
        json!({"email": email, "password": "password123", "name": "Ana Ruiz"}),
    )
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn signup_returns_created_account_and_token() {
    let app = TestApp::new();

    let response = app.request(signup("a@x.com")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "a@x.com");
    assert_eq!(body["user"]["display_name"], "Ana Ruiz");
    assert!(body["user"].get("password_hash").is_none());
    let token = body["token"].as_str().unwrap();
    assert_eq!(
        app.credentials.validate_token(token).unwrap(),
        body["user"]["user_id"].as_str().unwrap()
    );
}

#[tokio::test]
async fn duplicate_signup_is_conflict() {
    let app = TestApp::new();
    assert_eq!(app.request(signup("a@x.com")).await.status(), StatusCode::CREATED);

    let response = app.request(signup("a@x.com")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "Account already exists");
}

#[tokio::test]
async fn blacklisted_signup_is_forbidden() {
    let app = TestApp::new();
    app.screener.set_blacklisted(true);

    let response = app.request(signup("a@x.com")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.store.accounts().is_empty());
}

#[tokio::test]
async fn screening_outage_without_fail_open_is_internal_error() {
    let app = TestApp::build(common::Mode::Outbox, false);
    app.screener.set_failing(true);

    let response = app.request(signup("a@x.com")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(!body["error"].as_str().unwrap().contains("simulated"));
}

#[tokio::test]
async fn rule_violations_are_unprocessable() {
    let app = TestApp::new();

    for body in [
        json!({"email": "not-an-email", "password": "password123", "name": "Ana"}),
        json!({"email": "a@x.com", "password": "short", "name": "Ana"}),
        json!({"email": "a@x.com", "password": "password123", "name": ""}),
    ] {
        let response = app.request(json_request("POST", "/api/v1/users", body)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
    assert_eq!(app.screener.calls(), 0);
}

#[tokio::test]
async fn malformed_or_incomplete_body_is_bad_request() {
    let app = TestApp::new();

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/v1/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\":"))
        .unwrap();
    assert_eq!(app.request(malformed).await.status(), StatusCode::BAD_REQUEST);

    let missing_name = json_request(
        "POST",
        "/api/v1/users",
        json!({"email": "a@x.com", "password": "password123"}),
    );
    let response = app.request(missing_name).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn blank_name_passing_length_rule_is_bad_request() {
    let app = TestApp::new();
    let response = app
        .request(json_request(
            "POST",
            "/api/v1/users",
            json!({"email": "a@x.com", "password": "password123", "name": "   "}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_round_trip() {
    let app = TestApp::new();
    app.request(signup("a@x.com")).await;

    let ok = app
        .request(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "a@x.com", "password": "password123"}),
        ))
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body = body_json(ok).await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["token"].as_str().is_some());

    let wrong = app
        .request(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "a@x.com", "password": "wrong-password"}),
        ))
        .await;
    let unknown = app
        .request(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({"email": "b@x.com", "password": "password123"}),
        ))
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await, body_json(unknown).await);
}

#[tokio::test]
async fn me_requires_valid_bearer_token() {
    let app = TestApp::new();
    let created = body_json(app.request(signup("a@x.com")).await).await;
    let token = created["token"].as_str().unwrap();

    assert_eq!(
        app.request(get("/api/v1/users/me", None)).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.request(get("/api/v1/users/me", Some("garbage"))).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let response = app.request(get("/api/v1/users/me", Some(token))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], created["user"]["user_id"]);
    assert_eq!(body["email"], "a@x.com");
}

#[tokio::test]
async fn me_with_expired_token_is_unauthorized() {
    let app = TestApp::new();
    let created = body_json(app.request(signup("a@x.com")).await).await;
    let user_id = created["user"]["user_id"].as_str().unwrap();

    let expired = common::credentials_with_ttl(-5).issue_token(user_id).unwrap();
    assert_eq!(
        app.request(get("/api/v1/users/me", Some(&expired))).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn me_for_token_with_unknown_subject_is_not_found() {
    let app = TestApp::new();
    let token = app
        .credentials
        .issue_token(&uuid::Uuid::new_v4().to_string())
        .unwrap();

    assert_eq!(
        app.request(get("/api/v1/users/me", Some(&token))).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn health_reports_dependencies() {
    let app = TestApp::new();

    let response = app.request(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "up");
    assert_eq!(body["checks"]["event_channel"], "up");
    assert_eq!(body["checks"]["event_consumer"], "disabled");

    app.store.set_unavailable(true);
    let response = app.request(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["checks"]["database"], "down");
}

#[tokio::test]
async fn health_reports_stopped_consumer() {
    let app = TestApp::new();
    // Consumer on its own connection, as in the binary.
    let consumer_channel = MemoryChannel::new();
    let consumer = EventConsumer::new(
        Arc::new(consumer_channel.clone()),
        common::QUEUE,
        common::fast_policy(3),
    )
    .with_poll_wait(Duration::from_millis(20));

    let mut state = app.state.clone();
    state.consumer = Some(consumer.health());
    let router = onboarding_service::build_router(state);

    let response = router.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["checks"]["event_consumer"], "up");

    consumer_channel.close();
    let result = consumer.run(&app.recorder(), CancellationToken::new()).await;
    assert!(result.is_err());

    let response = router.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["checks"]["event_channel"], "up");
    assert_eq!(body["checks"]["event_consumer"], "down");
}

#[tokio::test]
async fn health_reports_closed_event_channel() {
    let app = TestApp::new();
    app.channel.close();

    let response = app.request(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["checks"]["event_channel"], "down");
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let app = TestApp::new();
    let response = app.request(get("/.well-known/openapi.json", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = body_json(response).await;
    assert!(doc["paths"].get("/api/v1/users").is_some());
    assert!(doc["paths"].get("/api/v1/auth/login").is_some());
    assert!(doc["components"]["securitySchemes"].get("bearer_auth").is_some());
}

#[tokio::test]
async fn responses_carry_security_and_request_id_headers() {
    let app = TestApp::new();
    let response = app.request(get("/health", None)).await;

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["cache-control"], "no-store");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn caller_request_id_is_echoed() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();

    let response = app.request(request).await;
    assert_eq!(response.headers()["x-request-id"], "req-123");
}
