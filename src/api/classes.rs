//! Class API endpoints
//!
//! - /api/v1/classes, /classes/{id}
//! - POST /classes/enroll with `{"class_code": "..."}`
//! - POST /classes/{id}/leave, GET /classes/{id}/students

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{Detail, Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ClassInput, StudentClass, UpdateClassInput, User};

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub class_code: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/enroll", post(enroll))
        .route("/{id}", get(get_class).put(update).patch(update).delete(delete))
        .route("/{id}/leave", post(leave))
        .route("/{id}/students", get(students))
}

async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<StudentClass>>, ApiError> {
    let result = state.class_service.list(&user, &page.into()).await?;
    Ok(Json(result.into()))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<ClassInput>,
) -> Result<(StatusCode, Json<StudentClass>), ApiError> {
    let class = state.class_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn get_class(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<StudentClass>, ApiError> {
    Ok(Json(state.class_service.get(&user, id).await?))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateClassInput>,
) -> Result<Json<StudentClass>, ApiError> {
    Ok(Json(state.class_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.class_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn enroll(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<StudentClass>), ApiError> {
    let class = state.class_service.enroll(&user, &body.class_code).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn leave(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Detail>, ApiError> {
    state.class_service.leave(&user, id).await?;
    Ok(Json(Detail::new("Left the class")))
}

async fn students(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.class_service.students(&user, id).await?))
}
