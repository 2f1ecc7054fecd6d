use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Recommendations
        .route(
            "/users/:user_id/recommendations",
            get(handlers::get_recommendations),
        )
        .route("/users/:user_id/trending", get(handlers::get_trending))
        .route(
            "/users/:user_id/explain/:movie_id",
            get(handlers::explain),
        )
        // Catalog
        .route("/movies", put(handlers::upsert_movie))
        .route("/movies/:movie_id/similar", get(handlers::get_similar_movies))
        .route("/movies/:movie_id/reviews", post(handlers::ingest_reviews))
        // Feedback
        .route("/feedback", post(handlers::record_feedback))
        // Model
        .route("/model/version", get(handlers::get_model_version))
        .route("/model/retrain", post(handlers::retrain))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
