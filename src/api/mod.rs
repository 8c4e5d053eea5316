//! API layer
//!
//! HTTP handlers for:
//! - Profiles and user search
//! - Follow graph
//! - Posts
//! - Live snapshots (SSE)
//! - Metrics (Prometheus)

mod dto;
mod follows;
pub mod metrics;
mod posts;
mod streaming;
mod users;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};

pub use dto::*;
pub use metrics::metrics_router;

use crate::AppState;
use crate::auth::require_auth;

/// Create the `/api` router
///
/// Routes are split into public and authenticated endpoints.
pub fn graph_api_router(state: AppState) -> Router<AppState> {
    // Public endpoints (no authentication required)
    let public_routes = Router::new()
        .route("/v1/users/search", get(users::search_users))
        .route("/v1/users/:id", get(users::get_profile))
        .route("/v1/users/:id/relationship", get(follows::relationship))
        .route("/v1/users/:id/followers", get(follows::followers))
        .route("/v1/users/:id/following", get(follows::following))
        .route("/v1/users/:id/posts", get(posts::list_posts))
        .route(
            "/v1/streaming/users/:id/posts",
            get(streaming::stream_posts),
        )
        .route(
            "/v1/streaming/users/:id/profile",
            get(streaming::stream_profile),
        );

    // Authenticated endpoints (require valid token)
    let authenticated_routes = Router::new()
        .route("/v1/users", post(users::create_profile))
        .route("/v1/users/me/username", patch(users::update_username))
        .route("/v1/users/:id/follow", post(follows::follow))
        .route("/v1/users/:id/unfollow", post(follows::unfollow))
        .route(
            "/v1/users/:id/counters/audit",
            get(follows::audit_counters),
        )
        .route("/v1/posts", post(posts::create_post))
        .route("/v1/posts/:id", delete(posts::delete_post))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public_routes.merge(authenticated_routes)
}
