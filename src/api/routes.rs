use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/items/:item_id/recommendations",
            get(handlers::recommendations),
        )
        .route("/strategies", get(handlers::list_strategies))
        // Administration
        .route("/admin/corpus/reload", post(handlers::reload_corpus))
        .route(
            "/admin/strategies/:strategy/precompute",
            post(handlers::precompute),
        )
        .route(
            "/admin/strategies/:strategy/rebuild",
            post(handlers::rebuild),
        )
}
