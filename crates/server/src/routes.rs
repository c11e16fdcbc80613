//! Route configuration.

use crate::state::AppState;
use crate::{control, dispatch, iam, store};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let storage_routes = Router::new()
        .route(
            "/buckets/{bucket}",
            put(store::create_bucket).delete(store::delete_bucket),
        )
        .route(
            "/buckets/{bucket}/versioning",
            put(store::put_bucket_versioning),
        )
        .route("/buckets/{bucket}/objects", get(store::list_objects))
        .route(
            "/buckets/{bucket}/objects/{*key}",
            put(store::put_object)
                .get(store::get_object)
                .delete(store::delete_object),
        );

    let identity_routes = Router::new()
        .route("/users", post(iam::create_user))
        .route("/users/{name}", axum::routing::delete(iam::delete_user))
        .route("/users/{name}/keys", post(iam::create_access_key))
        .route(
            "/users/{name}/policies/{policy_name}",
            put(iam::put_user_policy).delete(iam::delete_user_policy),
        )
        .route(
            "/users/{name}/attached-policies",
            post(iam::attach_user_policy),
        )
        .route("/policies", post(iam::create_policy));

    let control_routes = Router::new()
        .route("/health", get(control::health_check))
        .route("/reset", post(control::reset))
        .route("/reset-auth", post(control::reset_auth))
        .route("/rate_limit", post(control::rate_limit));

    Router::new()
        .merge(storage_routes)
        .merge(identity_routes)
        .merge(control_routes)
        // Dispatch, throttle and enforcement run in front of every route.
        .layer(middleware::from_fn_with_state(state.clone(), dispatch::gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
