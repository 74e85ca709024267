//! Identity API endpoints: users, learner profiles and teacher profiles
//!
//! Every route here requires authentication.
//! - /api/v1/users, /users/{id}, /users/me, /users/change_password,
//!   /users/leaderboard, /users/{id}/role
//! - /api/v1/profiles, /profiles/{id}, /profiles/{id}/update_streak
//! - /api/v1/teacher-profiles, /teacher-profiles/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{Detail, Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    LeaderboardEntry, TeacherProfile, UpdateProfileInput, UpdateTeacherProfileInput, User, UserProfile,
    UserRole,
};
use crate::services::user::{ChangePasswordInput, StreakResponse, UpdateUserInput};

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(me).put(update_me).patch(update_me))
        .route("/change_password", post(change_password))
        .route("/leaderboard", get(leaderboard))
        .route("/{id}", get(get_user).put(update_user).patch(update_user).delete(delete_user))
        .route("/{id}/role", post(set_role))
}

pub fn profiles_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_profiles))
        .route("/{id}", get(get_profile).put(update_profile).patch(update_profile))
        .route("/{id}/update_streak", post(update_streak))
}

pub fn teacher_profiles_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_teacher_profiles))
        .route(
            "/{id}",
            get(get_teacher_profile)
                .put(update_teacher_profile)
                .patch(update_teacher_profile),
        )
}

// ============================================================================
// Users
// ============================================================================

async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<User>>, ApiError> {
    let result = state.user_service.list_users(&user, &page.into()).await?;
    Ok(Json(result.into()))
}

async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}

async fn update_me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.update_me(&user, input).await?))
}

async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<ChangePasswordInput>,
) -> Result<Json<Detail>, ApiError> {
    state.user_service.change_password(&user, input).await?;
    Ok(Json(Detail::new("Password changed successfully")))
}

async fn leaderboard(State(state): State<AppState>) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    Ok(Json(state.user_service.leaderboard().await?))
}

async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.get_user(&user, id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.update_user(&user, id, input).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_user(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_role(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.set_role(&user, id, body.role).await?))
}

// ============================================================================
// Profiles
// ============================================================================

async fn list_profiles(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<UserProfile>>, ApiError> {
    let result = state.user_service.list_profiles(&user, &page.into()).await?;
    Ok(Json(result.into()))
}

async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.user_service.get_profile(&user, id).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(state.user_service.update_profile(&user, id, input).await?))
}

async fn update_streak(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<StreakResponse>, ApiError> {
    Ok(Json(state.user_service.update_streak(&user, id).await?))
}

// ============================================================================
// Teacher profiles
// ============================================================================

async fn list_teacher_profiles(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<TeacherProfile>>, ApiError> {
    let result = state
        .user_service
        .list_teacher_profiles(&user, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_teacher_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<TeacherProfile>, ApiError> {
    Ok(Json(state.user_service.get_teacher_profile(&user, id).await?))
}

async fn update_teacher_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateTeacherProfileInput>,
) -> Result<Json<TeacherProfile>, ApiError> {
    Ok(Json(
        state
            .user_service
            .update_teacher_profile(&user, id, input)
            .await?,
    ))
}
