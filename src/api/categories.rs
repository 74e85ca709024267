//! Category API endpoints
//!
//! - GET /api/v1/content/categories - List categories
//! - GET /api/v1/content/categories/{id_or_slug} - One category
//! - POST, PUT/PATCH, DELETE - Staff only

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Category, CategoryInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{key}", get(get_category).put(update).patch(update).delete(delete))
}

async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Category>>, ApiError> {
    let result = state.category_service.list(&page.into()).await?;
    Ok(Json(result.into()))
}

/// Numeric keys are ids, anything else is a slug
async fn get_category(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let category = match key.parse::<i64>() {
        Ok(id) => state.category_service.get(id).await?,
        Err(_) => state.category_service.get_by_slug(&key).await?,
    };
    Ok(Json(category))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
