//! Submission API endpoints
//!
//! - /api/v1/challenges/submissions - Role-scoped list, filters `challenge`,
//!   `language` and `status`
//! - POST /submissions/{id}/resubmit - Back to pending
//! - POST /submissions/{id}/evaluate - Admin records a judge outcome

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{EvaluationInput, Submission, SubmissionFilter};
use crate::services::submission::SubmissionInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_submission).delete(delete))
        .route("/{id}/resubmit", post(resubmit))
        .route("/{id}/evaluate", post(evaluate))
}

async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
    Query(filter): Query<SubmissionFilter>,
) -> Result<Json<Page<Submission>>, ApiError> {
    let result = state
        .submission_service
        .list(&user, &filter, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_submission(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Submission>, ApiError> {
    Ok(Json(state.submission_service.get(&user, id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<SubmissionInput>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let submission = state.submission_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.submission_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resubmit(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Submission>, ApiError> {
    Ok(Json(state.submission_service.resubmit(&user, id).await?))
}

async fn evaluate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<EvaluationInput>,
) -> Result<Json<Submission>, ApiError> {
    Ok(Json(state.submission_service.evaluate(&user, id, input).await?))
}
