//! Control endpoints driven by the test harness.

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, AuthGrace, Backend};
use axum::extract::State;
use axum::Json;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health - Readiness probe.
///
/// Intentionally unauthenticated and exempt from throttling so startup
/// supervision keeps working whatever state a test has driven the backend
/// into.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /reset - Wipe the whole backend.
///
/// Buckets, objects, users, policies, enforcement state and any injected
/// throttle all go back to their initial, permissive values.
pub async fn reset(State(state): State<AppState>) -> ApiResult<&'static str> {
    let mut backend = state.lock().await;
    *backend = Backend::default();
    tracing::info!("backend reset to initial state");
    Ok("Reset complete")
}

/// POST /reset-auth - Set the auth-grace counter.
///
/// Plain-text body: the number of requests remaining before enforcement
/// begins, or `inf` to disable enforcement.
pub async fn reset_auth(State(state): State<AppState>, body: String) -> ApiResult<&'static str> {
    let grace = AuthGrace::parse(&body)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid auth grace: {body:?}")))?;
    let mut backend = state.lock().await;
    backend.auth_grace = grace;
    tracing::info!(enforcing = grace.enforcing(), "auth grace updated");
    Ok("Auth state set")
}

/// POST /rate_limit - Arm the request throttle.
///
/// Plain-text integer body: the number of requests that will still be
/// served before every counted request receives a `SlowDown` response.
/// Negative values disable throttling.
pub async fn rate_limit(State(state): State<AppState>, body: String) -> ApiResult<&'static str> {
    let remaining = body
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid rate limit: {body:?}")))?;
    let mut backend = state.lock().await;
    backend.requests_until_throttle = u64::try_from(remaining).ok();
    tracing::info!(remaining, "rate limit updated");
    Ok("Limit accepted")
}
