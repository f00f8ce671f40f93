#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use hakayat::config::Config;
use hakayat::services::{MemoryStorage, Storage};
use hakayat::state::AppState;

// ---------------------------------------------------------------------------
// TestApp：每个测试独立的内存实例
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    pub storage: Arc<MemoryStorage>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn error_code(&self) -> &str {
        self.body["error"]["code"].as_str().unwrap_or("")
    }
}

pub struct TestUser {
    pub id: String,
    pub name: String,
    pub token: String,
}

pub fn app() -> TestApp {
    TestApp::with_config(Config::default())
}

impl TestApp {
    pub fn with_config(config: Config) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let state = Arc::new(
            AppState::new(config, storage.clone() as Arc<dyn Storage>)
                .expect("failed to build app state"),
        );
        Self {
            router: hakayat::app(state.clone()),
            state,
            storage,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        self.send(request).await
    }

    /// 发送自行构造的请求（需要自定义请求头时使用）
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error");

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .expect("failed to read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, None, token).await
    }

    pub async fn post_json(&self, uri: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::POST, uri, Some(body), token).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::POST, uri, None, token).await
    }

    pub async fn put_json(&self, uri: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::PUT, uri, Some(body), token).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, None, token).await
    }

    /// 打开匿名会话，返回令牌
    pub async fn open_session(&self) -> String {
        let resp = self.post("/api/hakayat/auth/session", None).await;
        assert_eq!(resp.status, StatusCode::OK);
        resp.data()["token"].as_str().unwrap().to_string()
    }

    pub async fn login(&self, name: &str) -> TestUser {
        let resp = self
            .post_json("/api/hakayat/auth/login", serde_json::json!({ "name": name }), None)
            .await;
        assert_eq!(resp.status, StatusCode::OK, "login failed: {}", resp.body);
        TestUser {
            id: resp.data()["user"]["id"].as_str().unwrap().to_string(),
            name: resp.data()["user"]["name"].as_str().unwrap().to_string(),
            token: resp.data()["token"].as_str().unwrap().to_string(),
        }
    }

    /// 以指定用户发布一篇故事，返回故事 ID
    pub async fn create_story(&self, user: &TestUser, title: &str, category: &str) -> String {
        let resp = self
            .post_json(
                "/api/hakayat/stories",
                serde_json::json!({
                    "title": title,
                    "content": format!("{} content", title),
                    "category": category
                }),
                Some(&user.token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "create failed: {}", resp.body);
        resp.data()["id"].as_str().unwrap().to_string()
    }
}
