//! HTTP route definitions
//!
//! Each API version gets its own chain. `/v1` is retired: permissive CORS,
//! then a 410 for every path and method. `/v2` runs the tenant-aware CORS
//! gate, then the route's rate limiter, then token verification, then the
//! handler. The guard set of every `/v2` route is declared in [`v2_router`].

use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{any, get, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use tollgate_core::LimitPolicy;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Stages a route runs between the CORS gate and its handler
#[derive(Clone, Copy, Debug)]
pub struct Guard {
    pub limit: LimitPolicy,
    pub verify_token: bool,
}

impl Guard {
    pub const fn per_ip() -> Self {
        Self {
            limit: LimitPolicy::PerIp,
            verify_token: true,
        }
    }

    pub const fn tiered() -> Self {
        Self {
            limit: LimitPolicy::Tiered,
            verify_token: true,
        }
    }

    pub const fn without_token(mut self) -> Self {
        self.verify_token = false;
        self
    }
}

/// Wrap a handler in its rate limit and token stages, limiter outermost
fn guarded(
    route: MethodRouter<Arc<AppState>>,
    state: &Arc<AppState>,
    guard: Guard,
) -> MethodRouter<Arc<AppState>> {
    let route = if guard.verify_token {
        route.layer(axum_middleware::from_fn_with_state(
            Arc::clone(state),
            middleware::verify_token,
        ))
    } else {
        route
    };

    match guard.limit {
        LimitPolicy::PerIp => route.layer(axum_middleware::from_fn_with_state(
            Arc::clone(state),
            middleware::per_ip_rate_limit,
        )),
        LimitPolicy::Tiered => route.layer(axum_middleware::from_fn_with_state(
            Arc::clone(state),
            middleware::tiered_rate_limit,
        )),
    }
}

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(v1_router())
        .merge(v2_router(&state))
        .fallback(handlers::not_found)
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .with_state(state)
}

/// Legacy version: every route answers 410
fn v1_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1", any(handlers::deprecated))
        .route("/v1/{*rest}", any(handlers::deprecated))
        .layer(CorsLayer::permissive())
}

/// Current version
fn v2_router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Issuance cannot demand the token it is about to hand out.
        .route(
            "/v2/token",
            guarded(post(handlers::issue_token), state, Guard::per_ip().without_token()),
        )
        .route("/v2/test", guarded(get(handlers::token_test), state, Guard::per_ip()))
        .route("/v2/posts/my", guarded(get(handlers::my_posts), state, Guard::tiered()))
        .route(
            "/v2/posts/hashtag/{title}",
            guarded(get(handlers::posts_by_hashtag), state, Guard::per_ip()),
        )
        .route(
            "/v2/followers/my",
            guarded(get(handlers::my_followers), state, Guard::tiered()),
        )
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(state),
            middleware::cors_gate,
        ))
}
