//! govcon-api library - read API over the ETL tables
//!
//! Serves run logs, iceberg opportunities and contractor profiles.
//! Every `/api` route passes through the rate limiter.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod api;
pub mod error;
pub mod rate_limit;

use rate_limit::RateLimiter;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(db: SqlitePool, limiter: Arc<RateLimiter>) -> Self {
        Self { db, limiter }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::get;
    use tower_http::trace::TraceLayer;

    // Rate-limited routes
    let limited = Router::new()
        .route("/api/load-logs", get(api::list_load_logs))
        .route("/api/contractors/:uei/iceberg", get(api::get_contractor_iceberg))
        .route("/api/contractors/:uei/profile", get(api::get_contractor_profile))
        .route("/api/profiles/:profile_key", get(api::get_profile))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ));

    Router::new()
        .merge(limited)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
