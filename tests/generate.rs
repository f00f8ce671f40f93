//! AI 生成接口测试（上游使用 wiremock 模拟）

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{app, TestApp};
use hakayat::config::Config;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn app_with_upstream(server: &MockServer) -> TestApp {
    TestApp::with_config(Config {
        gemini_api_key: Some("test-key".to_string()),
        gemini_api_url: server.uri(),
        gemini_model: "test-model".to_string(),
        ..Config::default()
    })
}

#[tokio::test]
async fn generate_requires_login() {
    let app = app();
    let resp = app
        .post_json("/api/hakayat/generate", json!({ "prompt": "a dragon" }), None)
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn generate_without_key_is_unavailable() {
    let app = app();
    let alice = app.login("Alice").await;
    let resp = app
        .post_json("/api/hakayat/generate", json!({ "prompt": "a dragon" }), Some(&alice.token))
        .await;
    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.error_code(), "GENERATION_NOT_CONFIGURED");
}

#[tokio::test]
async fn generate_rejects_blank_prompt() {
    let app = app();
    let alice = app.login("Alice").await;
    let resp = app
        .post_json("/api/hakayat/generate", json!({ "prompt": "  " }), Some(&alice.token))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_returns_draft_without_saving() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{
                    "text": "```json\n{\"title\":\"Dragon\",\"content\":\"Fire...\",\"category\":\"fantasy\"}\n```"
                }]}
            }]
        })))
        .mount(&server)
        .await;

    let app = app_with_upstream(&server).await;
    let alice = app.login("Alice").await;
    let resp = app
        .post_json("/api/hakayat/generate", json!({ "prompt": "a dragon" }), Some(&alice.token))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["title"], "Dragon");
    assert_eq!(resp.data()["category"], "fantasy");
    assert!(app.state.store.stories().is_empty());
}

#[tokio::test]
async fn generate_reports_invalid_category() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{
                    "text": "{\"title\":\"Ode\",\"content\":\"...\",\"category\":\"poetry\"}"
                }]}
            }]
        })))
        .mount(&server)
        .await;

    let app = app_with_upstream(&server).await;
    let alice = app.login("Alice").await;
    let resp = app
        .post_json("/api/hakayat/generate", json!({ "prompt": "an ode" }), Some(&alice.token))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_GATEWAY);
    assert_eq!(resp.error_code(), "GENERATION_FAILED");
}

#[tokio::test]
async fn generate_is_rate_limited() {
    let app = TestApp::with_config(Config {
        rate_limit_requests: 1,
        ..Config::default()
    });
    let alice = app.login("Alice").await;

    let first = app
        .post_json("/api/hakayat/generate", json!({ "prompt": "one" }), Some(&alice.token))
        .await;
    assert_eq!(first.status, StatusCode::SERVICE_UNAVAILABLE);

    let second = app
        .post_json("/api/hakayat/generate", json!({ "prompt": "two" }), Some(&alice.token))
        .await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.error_code(), "RATE_LIMIT_EXCEEDED");
}

fn generate_from(ip: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/hakayat/generate")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(json!({ "prompt": "a dragon" }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn forged_forwarded_for_does_not_reset_rate_limit() {
    let app = TestApp::with_config(Config {
        rate_limit_requests: 1,
        ..Config::default()
    });
    let alice = app.login("Alice").await;

    let first = app.send(generate_from("203.0.113.1", &alice.token)).await;
    assert_eq!(first.status, StatusCode::SERVICE_UNAVAILABLE);

    let second = app.send(generate_from("203.0.113.2", &alice.token)).await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn trusted_proxy_limits_per_forwarded_client() {
    let app = TestApp::with_config(Config {
        rate_limit_requests: 1,
        trust_proxy_headers: true,
        ..Config::default()
    });
    let alice = app.login("Alice").await;

    let first = app.send(generate_from("203.0.113.1", &alice.token)).await;
    assert_eq!(first.status, StatusCode::SERVICE_UNAVAILABLE);

    let other_client = app.send(generate_from("203.0.113.2", &alice.token)).await;
    assert_eq!(other_client.status, StatusCode::SERVICE_UNAVAILABLE);

    let repeat = app.send(generate_from("203.0.113.1", &alice.token)).await;
    assert_eq!(repeat.status, StatusCode::TOO_MANY_REQUESTS);
}
