//! Server test utilities.

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shoal_server::{create_router, AppState};
use tower::ServiceExt;

/// Host name that routes to the storage backend.
pub const STORAGE_HOST: &str = "localhost";
/// Host name that routes to the identity backend.
pub const IDENTITY_HOST: &str = "127.0.0.1";

/// A test server driven through `tower::ServiceExt::oneshot`.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub state: AppState,
    pub router: axum::Router,
}

#[allow(dead_code)]
impl TestServer {
    pub fn new() -> Self {
        let state = AppState::new();
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    /// Send a bodyless request.
    pub async fn send(&self, method: Method, host: &str, path: &str) -> (StatusCode, Bytes) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, host)
            .body(Body::empty())
            .expect("failed to build request");
        self.dispatch(req).await
    }

    /// Send a request with a raw body.
    pub async fn send_bytes(
        &self,
        method: Method,
        host: &str,
        path: &str,
        body: impl Into<Bytes>,
    ) -> (StatusCode, Bytes) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, host)
            .body(Body::from(body.into()))
            .expect("failed to build request");
        self.dispatch(req).await
    }

    /// Send a request with a JSON body.
    pub async fn send_json<B: Serialize>(
        &self,
        method: Method,
        host: &str,
        path: &str,
        body: &B,
    ) -> (StatusCode, Bytes) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, host)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
            .expect("failed to build request");
        self.dispatch(req).await
    }

    /// Send a request carrying credential headers, with an optional JSON body.
    pub async fn send_authed<B: Serialize>(
        &self,
        method: Method,
        host: &str,
        path: &str,
        access_key: &str,
        secret_key: &str,
        body: Option<&B>,
    ) -> (StatusCode, Bytes) {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, host)
            .header("x-access-key", access_key)
            .header("x-secret-key", secret_key);
        let body = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(body).expect("serialize body"))
            }
            None => Body::empty(),
        };
        self.dispatch(builder.body(body).expect("failed to build request"))
            .await
    }

    async fn dispatch(&self, req: Request<Body>) -> (StatusCode, Bytes) {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("router call failed");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();
        (status, body)
    }
}

/// Decode a JSON response body, panicking with the raw body on mismatch.
#[allow(dead_code)]
pub fn json<T: DeserializeOwned>(body: &Bytes) -> T {
    serde_json::from_slice(body)
        .unwrap_or_else(|e| panic!("bad JSON body ({e}): {}", String::from_utf8_lossy(body)))
}
