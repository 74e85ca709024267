//! Discussion endpoints under /api/v1/challenges/discussions
//!
//! Reading is public. `?challenge=` narrows the list to one challenge.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{Detail, Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ChallengeDiscussion, DiscussionInput};

#[derive(Debug, Default, Deserialize)]
pub struct DiscussionQuery {
    pub challenge: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_discussion).put(update).patch(update).delete(delete))
        .route("/{id}/reply", post(reply))
        .route("/{id}/flag", post(flag))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
    Query(query): Query<DiscussionQuery>,
) -> Result<Json<Page<ChallengeDiscussion>>, ApiError> {
    let result = state
        .discussion_service
        .list(query.challenge, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_discussion(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChallengeDiscussion>, ApiError> {
    Ok(Json(state.discussion_service.get(id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<DiscussionInput>,
) -> Result<(StatusCode, Json<ChallengeDiscussion>), ApiError> {
    let post = state.discussion_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<DiscussionInput>,
) -> Result<Json<ChallengeDiscussion>, ApiError> {
    Ok(Json(state.discussion_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.discussion_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reply(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<DiscussionInput>,
) -> Result<(StatusCode, Json<ChallengeDiscussion>), ApiError> {
    let post = state.discussion_service.reply(&user, id, input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn flag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Detail>, ApiError> {
    state.discussion_service.flag(&user, id).await?;
    Ok(Json(Detail::new("Discussion flagged for review")))
}
