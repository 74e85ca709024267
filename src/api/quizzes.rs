//! Quiz and question API endpoints
//!
//! - /api/v1/content/quizzes - Public reads, staff writes
//! - POST /quizzes/{id}/start, /quizzes/{id}/take, /quizzes/{id}/rate
//! - GET /quizzes/{id}/attempts, /quizzes/{id}/attempts/{attempt_id}
//! - /api/v1/content/questions - Staff only, `?quiz=` narrows to one quiz

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{
    ContentRating, Question, QuestionInput, Quiz, QuizFilter, QuizInput, UpdateQuestionInput,
    UpdateQuizInput,
};
use crate::services::lesson::RateInput;
use crate::services::quiz::{AttemptHistory, AttemptReview, QuizSession, TakeQuizInput, TakeQuizResponse};

#[derive(Debug, Default, Deserialize)]
pub struct QuestionQuery {
    pub quiz: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_quiz).put(update).patch(update).delete(delete))
        .route("/{id}/start", post(start))
        .route("/{id}/take", post(take))
        .route("/{id}/attempts", get(attempts))
        .route("/{id}/attempts/{attempt_id}", get(review_attempt))
        .route("/{id}/rate", post(rate))
}

pub fn questions_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_questions).post(create_question))
        .route(
            "/{id}",
            get(get_question)
                .put(update_question)
                .patch(update_question)
                .delete(delete_question),
        )
}

// ============================================================================
// Quizzes
// ============================================================================

async fn list(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<QuizFilter>,
) -> Result<Json<Page<Quiz>>, ApiError> {
    let result = state
        .quiz_service
        .list(viewer.user(), filter, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_quiz(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<Quiz>, ApiError> {
    Ok(Json(state.quiz_service.get(viewer.user(), id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<QuizInput>,
) -> Result<(StatusCode, Json<Quiz>), ApiError> {
    let quiz = state.quiz_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateQuizInput>,
) -> Result<Json<Quiz>, ApiError> {
    Ok(Json(state.quiz_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.quiz_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<QuizSession>, ApiError> {
    Ok(Json(state.quiz_service.start(&user, id).await?))
}

async fn take(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<TakeQuizInput>,
) -> Result<Json<TakeQuizResponse>, ApiError> {
    Ok(Json(state.quiz_service.take(&user, id, input).await?))
}

async fn attempts(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<AttemptHistory>, ApiError> {
    Ok(Json(state.quiz_service.attempts(&user, id).await?))
}

async fn review_attempt(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, attempt_id)): Path<(i64, i64)>,
) -> Result<Json<AttemptReview>, ApiError> {
    Ok(Json(
        state
            .quiz_service
            .review_attempt(&user, id, attempt_id)
            .await?,
    ))
}

async fn rate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<RateInput>,
) -> Result<Json<ContentRating>, ApiError> {
    Ok(Json(state.quiz_service.rate(&user, id, input).await?))
}

// ============================================================================
// Questions
// ============================================================================

async fn list_questions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
    Query(query): Query<QuestionQuery>,
) -> Result<Json<Page<Question>>, ApiError> {
    let result = state
        .question_service
        .list(&user, query.quiz, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_question(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Question>, ApiError> {
    Ok(Json(state.question_service.get(&user, id).await?))
}

async fn create_question(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<QuestionInput>,
) -> Result<(StatusCode, Json<Question>), ApiError> {
    let question = state.question_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

async fn update_question(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateQuestionInput>,
) -> Result<Json<Question>, ApiError> {
    Ok(Json(state.question_service.update(&user, id, input).await?))
}

async fn delete_question(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.question_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
