//! Host-based backend dispatch, throttling injection and auth enforcement.
//!
//! The storage and identity backends are colocated on one port, so the
//! request's target host name decides which one a request reaches: names
//! containing the storage marker (and plain `localhost`) route to storage,
//! the loopback address routes to identity management. The same middleware
//! applies the injectable request throttle and the auth-grace counter, in
//! that order; control endpoints bypass all of it.

use crate::error::ApiError;
use crate::state::{AppState, AuthGrace};
use axum::body::Body;
use axum::extract::State;
use axum::http::header::HOST;
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::Response;

/// Which colocated backend a request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendClass {
    Storage,
    Identity,
}

/// Paths exempt from dispatch, throttling and auth counting.
const CONTROL_PATHS: [&str; 4] = ["/health", "/reset", "/reset-auth", "/rate_limit"];

/// Header carrying the access key id when enforcement is active.
pub const ACCESS_KEY_HEADER: &str = "x-access-key";
/// Header carrying the access key secret when enforcement is active.
pub const SECRET_KEY_HEADER: &str = "x-secret-key";

/// Classify a request host, ignoring any port suffix.
pub fn classify_host(host: &str) -> Option<BackendClass> {
    let name = host.split(':').next().unwrap_or(host);
    if name == "127.0.0.1" {
        Some(BackendClass::Identity)
    } else if name == "localhost" || name.contains("storage") {
        Some(BackendClass::Storage)
    } else {
        None
    }
}

/// The backend class a path belongs to, if any.
fn path_class(path: &str) -> Option<BackendClass> {
    if path.starts_with("/buckets") {
        Some(BackendClass::Storage)
    } else if path.starts_with("/users") || path.starts_with("/policies") {
        Some(BackendClass::Identity)
    } else {
        None
    }
}

/// The policy action guarding a route, derived from method and path.
pub fn required_action(method: &Method, path: &str) -> Option<&'static str> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match (method, segments.as_slice()) {
        (&Method::PUT, ["buckets", _]) => Some("storage:CreateBucket"),
        (&Method::DELETE, ["buckets", _]) => Some("storage:DeleteBucket"),
        (&Method::PUT, ["buckets", _, "versioning"]) => Some("storage:PutBucketVersioning"),
        (&Method::GET, ["buckets", _, "objects"]) => Some("storage:ListObjects"),
        (&Method::GET, ["buckets", _, "objects", ..]) => Some("storage:GetObject"),
        (&Method::PUT, ["buckets", _, "objects", ..]) => Some("storage:PutObject"),
        (&Method::DELETE, ["buckets", _, "objects", ..]) => Some("storage:DeleteObject"),
        (&Method::POST, ["users"]) => Some("iam:CreateUser"),
        (&Method::DELETE, ["users", _]) => Some("iam:DeleteUser"),
        (&Method::POST, ["users", _, "keys"]) => Some("iam:CreateAccessKey"),
        (&Method::PUT, ["users", _, "policies", _]) => Some("iam:PutUserPolicy"),
        (&Method::DELETE, ["users", _, "policies", _]) => Some("iam:DeleteUserPolicy"),
        (&Method::POST, ["users", _, "attached-policies"]) => Some("iam:AttachUserPolicy"),
        (&Method::POST, ["policies"]) => Some("iam:CreatePolicy"),
        _ => None,
    }
}

/// Gate middleware in front of both backends.
pub async fn gate(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    if CONTROL_PATHS.contains(&path.as_str()) {
        return Ok(next.run(req).await);
    }

    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .ok_or_else(|| ApiError::UnknownHost("<missing>".to_string()))?;
    let class = classify_host(&host).ok_or_else(|| ApiError::UnknownHost(host.clone()))?;

    // A valid route reached through the wrong backend host does not exist as
    // far as that backend is concerned.
    if let Some(wanted) = path_class(&path) {
        if wanted != class {
            return Err(ApiError::NotFound(format!("no route for {path} on {host}")));
        }
    }

    {
        let mut backend = state.lock().await;

        // Injected throttling. Once the counter reaches zero every counted
        // request is refused until a new limit is posted; throttled requests
        // do not consume auth-grace counts.
        match backend.requests_until_throttle {
            Some(0) => return Err(ApiError::SlowDown),
            Some(n) => backend.requests_until_throttle = Some(n - 1),
            None => {}
        }

        match backend.auth_grace {
            AuthGrace::Unlimited => {}
            AuthGrace::Remaining(0) => {
                let (id, secret) = credential_headers(&req)?;
                let action = required_action(req.method(), &path);
                let iam = &backend.iam;
                let (user_name, user) = iam
                    .authenticate(&id, &secret)
                    .ok_or_else(|| ApiError::Unauthorized(format!("unknown access key: {id}")))?;
                if let Some(action) = action {
                    if !iam.user_allows(user, action) {
                        return Err(ApiError::Forbidden(format!(
                            "user {user_name} may not {action}"
                        )));
                    }
                }
            }
            AuthGrace::Remaining(n) => backend.auth_grace = AuthGrace::Remaining(n - 1),
        }
    }

    Ok(next.run(req).await)
}

fn credential_headers(req: &Request<Body>) -> Result<(String, String), ApiError> {
    let get = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))
    };
    Ok((get(ACCESS_KEY_HEADER)?, get(SECRET_KEY_HEADER)?))
}
