//! Lesson API endpoints
//!
//! - GET /api/v1/content/lessons - Published lessons (staff also see drafts)
//! - GET /lessons/featured, /lessons/my_progress
//! - POST /lessons/{id}/complete, /lessons/{id}/rate
//!
//! Reads are open to anonymous callers; writes need a token.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{ContentRating, Lesson, LessonFilter, LessonInput, UpdateLessonInput};
use crate::services::lesson::{CompleteInput, CompletionResponse, LessonProgress, RateInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/featured", get(featured))
        .route("/my_progress", get(my_progress))
        .route("/{id}", get(get_lesson).put(update).patch(update).delete(delete))
        .route("/{id}/complete", post(complete))
        .route("/{id}/rate", post(rate))
}

async fn list(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<LessonFilter>,
) -> Result<Json<Page<Lesson>>, ApiError> {
    let result = state
        .lesson_service
        .list(viewer.user(), filter, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn featured(State(state): State<AppState>) -> Result<Json<Vec<Lesson>>, ApiError> {
    Ok(Json(state.lesson_service.featured().await?))
}

async fn my_progress(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<LessonProgress>, ApiError> {
    Ok(Json(state.lesson_service.my_progress(&user).await?))
}

async fn get_lesson(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<Lesson>, ApiError> {
    Ok(Json(state.lesson_service.get(viewer.user(), id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<LessonInput>,
) -> Result<(StatusCode, Json<Lesson>), ApiError> {
    let lesson = state.lesson_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateLessonInput>,
) -> Result<Json<Lesson>, ApiError> {
    Ok(Json(state.lesson_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.lesson_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The body is optional; `time_spent` is in minutes
async fn complete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<CompletionResponse>, ApiError> {
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        CompleteInput::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation_error(format!("Invalid request body: {}", e)))?
    };
    Ok(Json(state.lesson_service.complete(&user, id, input).await?))
}

async fn rate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<RateInput>,
) -> Result<Json<ContentRating>, ApiError> {
    Ok(Json(state.lesson_service.rate(&user, id, input).await?))
}
