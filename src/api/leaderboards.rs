//! Leaderboard and stats endpoints under /api/v1/gamification
//!
//! - leaderboards: admin CRUD, computed `data` on read, `/{id}/refresh`,
//!   `/global_rankings`
//! - stats: `user_stats`, `system_summary` (admin), `daily_login_bonus`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::{Page, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Leaderboard, LeaderboardInput, UpdateLeaderboardInput};
use crate::services::gamification::DailyLoginBonus;
use crate::services::leaderboard::{GlobalRankings, LeaderboardDetail};
use crate::services::stats::{SystemSummary, UserStats};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/global_rankings", get(global_rankings))
        .route("/{id}", get(get_board).put(update).patch(update).delete(delete))
        .route("/{id}/refresh", post(refresh))
}

pub fn stats_router() -> Router<AppState> {
    Router::new()
        .route("/user_stats", get(user_stats))
        .route("/system_summary", get(system_summary))
        .route("/daily_login_bonus", post(daily_login_bonus))
}

async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Leaderboard>>, ApiError> {
    let result = state.leaderboard_service.list(&user, &page.into()).await?;
    Ok(Json(result.into()))
}

async fn get_board(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LeaderboardDetail>, ApiError> {
    Ok(Json(state.leaderboard_service.get(&user, id).await?))
}

async fn create(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<LeaderboardInput>,
) -> Result<(StatusCode, Json<Leaderboard>), ApiError> {
    let board = state.leaderboard_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(board)))
}

async fn update(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateLeaderboardInput>,
) -> Result<Json<Leaderboard>, ApiError> {
    Ok(Json(state.leaderboard_service.update(&user, id, input).await?))
}

async fn delete(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.leaderboard_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LeaderboardDetail>, ApiError> {
    Ok(Json(state.leaderboard_service.refresh(&user, id).await?))
}

async fn global_rankings(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
) -> Result<Json<GlobalRankings>, ApiError> {
    Ok(Json(state.leaderboard_service.global_rankings().await?))
}

async fn user_stats(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<UserStats>, ApiError> {
    Ok(Json(state.stats_service.user_stats(&user).await?))
}

async fn system_summary(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<SystemSummary>, ApiError> {
    Ok(Json(state.stats_service.system_summary(&user).await?))
}

async fn daily_login_bonus(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<DailyLoginBonus>, ApiError> {
    Ok(Json(state.gamification_service.daily_login_bonus(&user).await?))
}
