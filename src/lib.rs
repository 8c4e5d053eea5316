//! artisan-graph - follow graph and denormalized counters for the Artisan
//! Marketplace
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Profile, follow and post endpoints                       │
//! │  - SSE live snapshots                                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Follow graph (guarded or blind counters)                 │
//! │  - Profiles, posts                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - DocumentStore trait, atomic write batches                │
//! │  - SQLite (sqlx)                                            │
//! │  - Change feed and live subscriptions                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Store boundary, SQLite store, subscriptions
//! - `auth`: Session token verification
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Largest accepted request body; posts are the biggest payload
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all handlers
///
/// Cheap to clone; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Document store
    pub store: Arc<data::Database>,

    /// Follow graph
    pub follows: Arc<service::FollowGraphService>,

    /// Profiles and search
    pub profiles: Arc<service::ProfileService>,

    /// Posts
    pub posts: Arc<service::PostService>,

    /// Live queries
    pub feed: data::LiveFeed,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database and run migrations
    /// 2. Wire the services to the store
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrated
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = data::Database::connect_with_capacity(
            &config.database.path,
            config.subscriptions.channel_capacity,
        )
        .await?;
        tracing::info!("Database connected");

        let state = Self::with_database(config, db);
        tracing::info!(
            counter_policy = ?state.follows.policy(),
            "Application state initialized successfully"
        );
        Ok(state)
    }

    /// Build state around an already connected database
    pub fn with_database(config: config::AppConfig, db: data::Database) -> Self {
        let db = Arc::new(db);
        let store: Arc<dyn data::DocumentStore> = db.clone();
        let max_page_size = config.graph.max_page_size;

        Self {
            follows: Arc::new(service::FollowGraphService::new(
                Arc::clone(&store),
                &config.graph,
            )),
            profiles: Arc::new(service::ProfileService::new(
                Arc::clone(&store),
                max_page_size,
            )),
            posts: Arc::new(service::PostService::new(
                Arc::clone(&store),
                max_page_size,
            )),
            feed: data::LiveFeed::new(store),
            store: db,
            config: Arc::new(config),
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower::ServiceBuilder;
    use axum::extract::DefaultBodyLimit;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api", api::graph_api_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer)
                .layer(CompressionLayer::new()),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
