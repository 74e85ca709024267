//! Challenge API endpoints
//!
//! - /api/v1/challenges/challenges - Public reads, staff writes
//! - POST /challenges/{id}/submit, /challenges/{id}/favorite, /challenges/{id}/rate
//! - GET /challenges/{id}/submissions, /challenges/{id}/leaderboard
//! - GET /challenges/featured, /challenges/my_progress, /challenges/recommendations
//! - /api/v1/challenges/ratings and /api/v1/challenges/favorites

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{
    Challenge, ChallengeFavorite, ChallengeFilter, ChallengeInput, ChallengeLeaderEntry,
    ChallengeRating, ChallengeRatingInput, Submission, UpdateChallengeInput,
};
use crate::services::challenge::{ChallengeProgress, ChallengeSubmissions, FavoriteInput, FavoriteToggle};
use crate::services::submission::SubmitInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/featured", get(featured))
        .route("/my_progress", get(my_progress))
        .route("/recommendations", get(recommendations))
        .route("/{id}", get(get_challenge).put(update).patch(update).delete(delete))
        .route("/{id}/submit", post(submit))
        .route("/{id}/submissions", get(submissions))
        .route("/{id}/favorite", post(toggle_favorite))
        .route("/{id}/rate", post(rate))
        .route("/{id}/leaderboard", get(leaderboard))
}

pub fn ratings_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_ratings))
        .route(
            "/{id}",
            get(get_rating)
                .put(update_rating)
                .patch(update_rating)
                .delete(delete_rating),
        )
}

pub fn favorites_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_favorites).post(add_favorite))
        .route("/{id}", axum::routing::delete(delete_favorite))
}

// ============================================================================
// Challenges
// ============================================================================

async fn list(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<ChallengeFilter>,
) -> Result<Json<Page<Challenge>>, ApiError> {
    let result = state
        .challenge_service
        .list(viewer.user(), filter, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn featured(State(state): State<AppState>) -> Result<Json<Vec<Challenge>>, ApiError> {
    Ok(Json(state.challenge_service.featured().await?))
}

async fn my_progress(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<ChallengeProgress>, ApiError> {
    Ok(Json(state.challenge_service.my_progress(&user).await?))
}

async fn recommendations(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Challenge>>, ApiError> {
    Ok(Json(state.challenge_service.recommendations(&user).await?))
}

async fn get_challenge(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<Challenge>, ApiError> {
    Ok(Json(state.challenge_service.get(viewer.user(), id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<ChallengeInput>,
) -> Result<(StatusCode, Json<Challenge>), ApiError> {
    let challenge = state.challenge_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(challenge)))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateChallengeInput>,
) -> Result<Json<Challenge>, ApiError> {
    Ok(Json(state.challenge_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.challenge_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<SubmitInput>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let submission = state.challenge_service.submit(&user, id, input).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

async fn submissions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ChallengeSubmissions>, ApiError> {
    Ok(Json(
        state
            .challenge_service
            .submissions(&user, id, &page.into())
            .await?,
    ))
}

async fn toggle_favorite(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<FavoriteToggle>, ApiError> {
    Ok(Json(state.challenge_service.toggle_favorite(&user, id).await?))
}

async fn rate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<ChallengeRatingInput>,
) -> Result<Json<ChallengeRating>, ApiError> {
    Ok(Json(state.challenge_service.rate(&user, id, input).await?))
}

async fn leaderboard(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ChallengeLeaderEntry>>, ApiError> {
    Ok(Json(state.challenge_service.leaderboard(id).await?))
}

// ============================================================================
// Ratings
// ============================================================================

async fn list_ratings(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ChallengeRating>>, ApiError> {
    let result = state
        .challenge_service
        .list_ratings(&user, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_rating(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ChallengeRating>, ApiError> {
    Ok(Json(state.challenge_service.get_rating(&user, id).await?))
}

async fn update_rating(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<ChallengeRatingInput>,
) -> Result<Json<ChallengeRating>, ApiError> {
    Ok(Json(
        state
            .challenge_service
            .update_rating(&user, id, input)
            .await?,
    ))
}

async fn delete_rating(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.challenge_service.delete_rating(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Favorites
// ============================================================================

async fn list_favorites(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ChallengeFavorite>>, ApiError> {
    let result = state
        .challenge_service
        .list_favorites(&user, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn add_favorite(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<FavoriteInput>,
) -> Result<(StatusCode, Json<ChallengeFavorite>), ApiError> {
    let favorite = state.challenge_service.add_favorite(&user, input).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

async fn delete_favorite(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.challenge_service.delete_favorite(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
