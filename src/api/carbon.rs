//! Carbon footprint endpoints under /api/v1/challenges/carbon-footprint
//!
//! `POST /calculate` previews a result without storing it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CarbonFootprint, CarbonInput, CarbonResult};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/calculate", post(calculate))
        .route("/{id}", get(get_footprint).delete(delete))
}

async fn calculate(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Json(input): Json<CarbonInput>,
) -> Result<Json<CarbonResult>, ApiError> {
    Ok(Json(state.carbon_service.calculate(&input)?))
}

async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<CarbonFootprint>>, ApiError> {
    let result = state.carbon_service.list(&user, &page.into()).await?;
    Ok(Json(result.into()))
}

async fn get_footprint(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<CarbonFootprint>, ApiError> {
    Ok(Json(state.carbon_service.get(&user, id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<CarbonInput>,
) -> Result<(StatusCode, Json<CarbonFootprint>), ApiError> {
    let footprint = state.carbon_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(footprint)))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.carbon_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
