use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, auth, collections, jobs};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Collection views
        .route("/api/v1/collections", get(collections::list_collections))
        .route(
            "/api/v1/collections/search",
            get(collections::search_collections),
        )
        .route(
            "/api/v1/collections/by-type/{type}",
            get(collections::by_type),
        )
        .route(
            "/api/v1/collections/{id}/navigation",
            get(collections::navigation),
        )
        .route(
            "/api/v1/collections/{id}/siblings",
            get(collections::siblings),
        )
        .route(
            "/api/v1/collections/{id}/thumbnail",
            get(collections::thumbnail),
        )
        .route("/api/v1/libraries", get(collections::list_libraries))
        .route(
            "/api/v1/libraries/{libraryId}/collections",
            get(collections::by_library),
        )
        // Index administration
        .route("/api/v1/admin/index/rebuild", post(admin::rebuild_index))
        .route("/api/v1/admin/index/verify", post(admin::verify_index))
        .route(
            "/api/v1/dashboard/statistics",
            get(admin::dashboard_statistics),
        )
        .route("/api/v1/dashboard/activity", get(admin::recent_activity))
        // Background jobs
        .route(
            "/api/v1/jobs",
            get(jobs::list_jobs).post(jobs::create_job),
        )
        .route("/api/v1/jobs/{id}", get(jobs::get_job))
        .route("/api/v1/jobs/{id}/cancel", post(jobs::cancel_job))
        // Authentication
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
