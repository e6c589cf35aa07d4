use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, metadata, middleware::metrics_middleware, providers};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Provider definitions
        .route(
            "/providers",
            get(providers::list_providers).post(providers::create_provider),
        )
        .route("/providers/schema", get(providers::provider_schema))
        .route("/providers/status", get(providers::provider_status))
        .route("/providers/test", post(providers::test_provider))
        .route(
            "/providers/{id}",
            get(providers::get_provider)
                .put(providers::update_provider)
                .delete(providers::delete_provider),
        )
        // Metadata lookups
        .route("/metadata/author/{id}", get(metadata::get_author))
        .route("/metadata/book/{id}", get(metadata::get_book))
        .route("/metadata/changed-authors", get(metadata::changed_authors))
        // Metadata searches
        .route("/metadata/search", get(metadata::search))
        .route("/metadata/search/author", get(metadata::search_authors))
        .route("/metadata/search/book", get(metadata::search_books))
        .route("/metadata/search/isbn/{isbn}", get(metadata::search_isbn))
        .route("/metadata/search/asin/{asin}", get(metadata::search_asin));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
