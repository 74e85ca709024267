//! Gamification API endpoints under /api/v1/gamification
//!
//! - badges: public catalog, admin CRUD, `/earned`, `/progress`,
//!   `/leaderboard`, `/{id}/award`
//! - point-transactions: the caller's ledger, `/summary`, `/leaderboard`
//! - user-badges: earned badges, `/{id}/toggle_display`
//! - achievements: `/recent`, `/summary`

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
    Achievement, Badge, BadgeInput, BadgeProgress, BadgeType, LeaderboardEntry, NewTransaction,
    PointTransaction, Rarity, TransactionType, UpdateBadgeInput, UserBadge,
};
use crate::services::badge::{AwardInput, AwardResponse};
use crate::services::gamification::{AchievementSummary, PointsSummary};

#[derive(Debug, Default, Deserialize)]
pub struct BadgeQuery {
    pub badge_type: Option<BadgeType>,
    pub rarity: Option<Rarity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub transaction_type: Option<TransactionType>,
}

pub fn badges_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_badges).post(create_badge))
        .route("/earned", get(earned))
        .route("/progress", get(progress))
        .route("/leaderboard", get(badge_leaderboard))
        .route(
            "/{id}",
            get(get_badge)
                .put(update_badge)
                .patch(update_badge)
                .delete(delete_badge),
        )
        .route("/{id}/award", post(award))
}

pub fn transactions_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route("/summary", get(points_summary))
        .route("/leaderboard", get(points_leaderboard))
        .route("/{id}", get(get_transaction))
}

pub fn user_badges_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_user_badges))
        .route("/{id}", get(get_user_badge))
        .route("/{id}/toggle_display", post(toggle_display))
}

pub fn achievements_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_achievements))
        .route("/recent", get(recent_achievements))
        .route("/summary", get(achievement_summary))
        .route("/{id}", get(get_achievement))
}

// ============================================================================
// Badges
// ============================================================================

async fn list_badges(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(page): Query<PageQuery>,
    Query(query): Query<BadgeQuery>,
) -> Result<Json<Page<Badge>>, ApiError> {
    let result = state
        .badge_service
        .list(viewer.user(), query.badge_type, query.rarity, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_badge(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<Badge>, ApiError> {
    Ok(Json(state.badge_service.get(viewer.user(), id).await?))
}

async fn create_badge(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(input): Json<BadgeInput>,
) -> Result<(StatusCode, Json<Badge>), ApiError> {
    let badge = state.badge_service.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(badge)))
}

async fn update_badge(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateBadgeInput>,
) -> Result<Json<Badge>, ApiError> {
    Ok(Json(state.badge_service.update(&user, id, input).await?))
}

async fn delete_badge(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.badge_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn earned(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<UserBadge>>, ApiError> {
    Ok(Json(state.badge_service.earned(&user).await?))
}

async fn progress(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<BadgeProgress>>, ApiError> {
    Ok(Json(state.badge_service.progress(&user).await?))
}

async fn badge_leaderboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    Ok(Json(state.badge_service.leaderboard().await?))
}

async fn award(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<AwardInput>,
) -> Result<Json<AwardResponse>, ApiError> {
    Ok(Json(state.badge_service.award(&user, id, input).await?))
}

// ============================================================================
// Point transactions
// ============================================================================

async fn list_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Page<PointTransaction>>, ApiError> {
    let result = state
        .gamification_service
        .list_transactions(&user, query.transaction_type, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<PointTransaction>, ApiError> {
    Ok(Json(state.gamification_service.get_transaction(&user, id).await?))
}

async fn create_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(entry): Json<NewTransaction>,
) -> Result<(StatusCode, Json<PointTransaction>), ApiError> {
    let transaction = state
        .gamification_service
        .create_transaction(&user, entry)
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

async fn points_summary(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<PointsSummary>, ApiError> {
    Ok(Json(state.gamification_service.points_summary(&user).await?))
}

async fn points_leaderboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    Ok(Json(state.gamification_service.points_leaderboard().await?))
}

// ============================================================================
// User badges
// ============================================================================

async fn list_user_badges(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<UserBadge>>, ApiError> {
    let result = state
        .badge_service
        .list_user_badges(&user, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_user_badge(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<UserBadge>, ApiError> {
    Ok(Json(state.badge_service.get_user_badge(&user, id).await?))
}

async fn toggle_display(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<UserBadge>, ApiError> {
    Ok(Json(state.badge_service.toggle_display(&user, id).await?))
}

// ============================================================================
// Achievements
// ============================================================================

async fn list_achievements(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Achievement>>, ApiError> {
    let result = state
        .gamification_service
        .list_achievements(&user, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_achievement(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Achievement>, ApiError> {
    Ok(Json(state.gamification_service.get_achievement(&user, id).await?))
}

async fn recent_achievements(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
) -> Result<Json<Vec<Achievement>>, ApiError> {
    Ok(Json(state.gamification_service.recent_achievements().await?))
}

async fn achievement_summary(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<AchievementSummary>, ApiError> {
    Ok(Json(state.gamification_service.achievement_summary(&user).await?))
}
