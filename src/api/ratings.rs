//! Content rating endpoints under /api/v1/content/ratings
//!
//! Users manage their own ratings; admins see every rating.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ContentRating, RatingInput};
use crate::services::rating::UpdateRatingInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_rating).put(update).patch(update).delete(delete))
}

async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ContentRating>>, ApiError> {
    let result = state.rating_service.list(&user, &page.into()).await?;
    Ok(Json(result.into()))
}

async fn get_rating(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ContentRating>, ApiError> {
    Ok(Json(state.rating_service.get(&user, id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<RatingInput>,
) -> Result<(StatusCode, Json<ContentRating>), ApiError> {
    let rating = state.rating_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateRatingInput>,
) -> Result<Json<ContentRating>, ApiError> {
    Ok(Json(state.rating_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.rating_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
