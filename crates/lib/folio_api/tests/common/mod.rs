//! Shared harness: in-memory stores behind the real router.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode, header};
use folio_api::{AppState, router};
use folio_core::auth::{InMemoryCredentialStore, TokenConfig};
use folio_core::books::InMemoryBookCatalog;
use folio_core::ratelimit::{CounterStore, InMemoryCounterStore, RateLimitConfig};
use serde_json::{Value, json};
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";

pub struct TestApp {
    pub state: AppState,
    pub credentials: Arc<InMemoryCredentialStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_counters(Arc::new(InMemoryCounterStore::new()))
    }

    pub fn with_counters(counters: Arc<dyn CounterStore>) -> Self {
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let state = AppState::new(
            &TokenConfig::new(SECRET),
            RateLimitConfig::default(),
            credentials.clone(),
            counters,
            Arc::new(InMemoryBookCatalog::new()),
        );
        Self { state, credentials }
    }

    /// Router as seen from `peer`.
    pub fn from_peer(&self, peer: [u8; 4]) -> Router {
        router(self.state.clone()).layer(MockConnectInfo(SocketAddr::from((peer, 40000))))
    }

    pub fn app(&self) -> Router {
        self.from_peer([127, 0, 0, 1])
    }

    pub async fn register(&self, username: &str) -> (StatusCode, Value) {
        let (status, _, body) = send(
            &self.app(),
            post_json(
                "/auth/register",
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "correct-horse",
                }),
            ),
        )
        .await;
        (status, body)
    }

    /// Register and log in; returns `(access_token, refresh_token)`.
    pub async fn login(&self, username: &str) -> (String, String) {
        self.register(username).await;
        let (status, _, body) = send(
            &self.app(),
            post_json(
                "/auth/login",
                json!({"username": username, "password": "correct-horse"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, headers, body)
}
