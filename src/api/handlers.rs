use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Ack, Explanation, FeedbackEvent, Mood, MoodOutcome, MovieFeature, MovieId,
    RecommendationContext, RecommendationResult, SimilarMovie, TrendingMovie, UserId,
};

use super::AppState;

const DEFAULT_K: usize = 10;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub k: Option<usize>,
    pub mood: Option<String>,
    /// Comma-separated user ids of the other watch-party members
    pub group: Option<String>,
}

impl RecommendationQuery {
    fn context(&self) -> AppResult<RecommendationContext> {
        Ok(RecommendationContext {
            mood: parse_mood(self.mood.as_deref())?,
            group: parse_group(self.group.as_deref())?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub mood: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TopKQuery {
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewsRequest {
    pub reviews: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelVersionResponse {
    pub version: u64,
}

fn parse_mood(raw: Option<&str>) -> AppResult<Option<Mood>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value.parse().map(Some).map_err(AppError::Validation),
        None => Ok(None),
    }
}

fn parse_group(raw: Option<&str>) -> AppResult<BTreeSet<UserId>> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s)
                .map_err(|_| AppError::Validation(format!("invalid group member id '{}'", s)))
        })
        .collect()
}

// Handlers

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "model_version": state.engine.model_version(),
        })),
    )
}

/// Fused recommendations for a user, optionally mood-filtered or for a group
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<RecommendationResult>> {
    let context = query.context()?;
    let k = query.k.unwrap_or(DEFAULT_K);
    let result = state
        .engine
        .get_recommendations(user_id, context, k)
        .await?;
    Ok(Json(result.as_ref().clone()))
}

/// Why a movie would be recommended to a user
pub async fn explain(
    State(state): State<AppState>,
    Path((user_id, movie_id)): Path<(UserId, MovieId)>,
    Query(query): Query<ExplainQuery>,
) -> AppResult<Json<Explanation>> {
    let mood = parse_mood(query.mood.as_deref())?;
    Ok(Json(state.engine.explain(user_id, movie_id, mood)?))
}

/// Content neighbours of a movie
pub async fn get_similar_movies(
    State(state): State<AppState>,
    Path(movie_id): Path<MovieId>,
    Query(query): Query<TopKQuery>,
) -> AppResult<Json<Vec<SimilarMovie>>> {
    let k = query.k.unwrap_or(DEFAULT_K);
    Ok(Json(state.engine.get_similar_movies(movie_id, k)?))
}

/// Popular unseen movies ordered by the user's genre taste
pub async fn get_trending(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<TopKQuery>,
) -> AppResult<Json<Vec<TrendingMovie>>> {
    let k = query.k.unwrap_or(DEFAULT_K);
    Ok(Json(state.engine.trending_for(user_id, k)?))
}

/// Insert or replace a movie's features
pub async fn upsert_movie(
    State(state): State<AppState>,
    Json(feature): Json<MovieFeature>,
) -> AppResult<StatusCode> {
    state.engine.upsert_movie(feature).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Recompute a movie's mood from its aggregated reviews
pub async fn ingest_reviews(
    State(state): State<AppState>,
    Path(movie_id): Path<MovieId>,
    Json(request): Json<ReviewsRequest>,
) -> AppResult<Json<MoodOutcome>> {
    Ok(Json(state.engine.ingest_reviews(movie_id, &request.reviews)?))
}

/// Record a rating, watch or click
pub async fn record_feedback(
    State(state): State<AppState>,
    Json(feedback): Json<FeedbackEvent>,
) -> AppResult<(StatusCode, Json<Ack>)> {
    let ack = state.engine.record_feedback(feedback).await?;
    let status = if ack.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ack)))
}

/// Currently served model version
pub async fn get_model_version(State(state): State<AppState>) -> Json<ModelVersionResponse> {
    Json(ModelVersionResponse {
        version: state.engine.model_version(),
    })
}

/// Retrain on the full feedback log and swap the served model
pub async fn retrain(State(state): State<AppState>) -> AppResult<Json<ModelVersionResponse>> {
    let version = state.engine.retrain().await?;
    Ok(Json(ModelVersionResponse { version }))
}
