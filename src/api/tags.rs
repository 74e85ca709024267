//! Tag API endpoints
//!
//! - GET /api/v1/content/tags, /tags/{id}
//! - POST, PUT/PATCH, DELETE - Staff only

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Tag;
use crate::services::tag::TagInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_tag).put(update).patch(update).delete(delete))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Tag>>, ApiError> {
    let result = state.tag_service.list(&page.into()).await?;
    Ok(Json(result.into()))
}

async fn get_tag(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.tag_service.get(id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<TagInput>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let tag = state.tag_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<TagInput>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.tag_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
