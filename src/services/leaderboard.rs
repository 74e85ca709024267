//! Leaderboard service
//!
//! Configured boards are ranked on demand. A computed ranking lives in the
//! cache for five minutes and is written back to the board row so the last
//! result is still there after an eviction.

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::leaderboard::RankQuery;
use crate::db::repositories::{ClassRepository, GamificationRepository, LeaderboardRepository};
use crate::models::{
    Leaderboard, LeaderboardEntry, LeaderboardInput, LeaderboardType, ListParams, PagedResult,
    UpdateLeaderboardInput, User,
};
use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const BOARD_LIMIT: i64 = 100;
const BOARD_TTL: Duration = Duration::from_secs(300);
const RANKINGS_LIMIT: i64 = 10;

service_error!(
    /// Error types for leaderboard operations
    LeaderboardServiceError
);

/// A board together with its current ranking
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardDetail {
    #[serde(flatten)]
    pub board: Leaderboard,
    pub data: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct GlobalRankings {
    pub top_points: Vec<LeaderboardEntry>,
    pub top_badges: Vec<LeaderboardEntry>,
    pub top_streaks: Vec<LeaderboardEntry>,
}

/// The ranking query a board runs at `now`
pub fn rank_query(board: &Leaderboard, now: DateTime<Utc>) -> RankQuery {
    let window = match board.leaderboard_type {
        LeaderboardType::WeeklyPoints => Some(7),
        LeaderboardType::MonthlyPoints => Some(30),
        _ => None,
    };
    let (since, until) = match (window, board.start_date, board.end_date) {
        (Some(_), Some(start), Some(end)) => (Some(start), Some(end)),
        (Some(days), _, _) => (Some(now - ChronoDuration::days(days)), None),
        (None, _, _) => (None, None),
    };
    RankQuery {
        kind: board.leaderboard_type,
        since,
        until,
        class_id: board.student_class_id,
        limit: BOARD_LIMIT,
    }
}

fn check_window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<(), LeaderboardServiceError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(LeaderboardServiceError::validation("start_date must be before end_date"));
        }
    }
    Ok(())
}

pub struct LeaderboardService {
    repo: Arc<dyn LeaderboardRepository>,
    gamification_repo: Arc<dyn GamificationRepository>,
    class_repo: Arc<dyn ClassRepository>,
    cache: Arc<Cache>,
}

impl LeaderboardService {
    pub fn new(
        repo: Arc<dyn LeaderboardRepository>,
        gamification_repo: Arc<dyn GamificationRepository>,
        class_repo: Arc<dyn ClassRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            gamification_repo,
            class_repo,
            cache,
        }
    }

    pub async fn list(&self, viewer: &User, params: &ListParams) -> Result<PagedResult<Leaderboard>, LeaderboardServiceError> {
        let (items, total) = self
            .repo
            .list_visible(viewer, params.offset(), params.limit())
            .await
            .context("Failed to list leaderboards")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// A board and its ranking
    pub async fn get(&self, viewer: &User, id: i64) -> Result<LeaderboardDetail, LeaderboardServiceError> {
        let board = self.visible(viewer, id).await?;

        let key = keys::leaderboard(id);
        if let Some(data) = self
            .cache
            .get::<Vec<LeaderboardEntry>>(&key)
            .await
            .ok()
            .flatten()
        {
            return Ok(LeaderboardDetail { board, data });
        }
        self.compute(board).await
    }

    pub async fn create(&self, admin: &User, input: LeaderboardInput) -> Result<Leaderboard, LeaderboardServiceError> {
        super::require_admin(admin).map_err(LeaderboardServiceError::Forbidden)?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(LeaderboardServiceError::validation("Leaderboard name is required"));
        }
        check_window(input.start_date, input.end_date)?;
        self.check_class(input.student_class_id).await?;

        let now = Utc::now();
        let board = Leaderboard {
            id: 0,
            name,
            leaderboard_type: input.leaderboard_type,
            description: input.description,
            is_active: input.is_active,
            start_date: input.start_date,
            end_date: input.end_date,
            student_class_id: input.student_class_id,
            cached_data: Vec::new(),
            last_updated: None,
            created_at: now,
            updated_at: now,
        };
        Ok(self.repo.create(&board).await.context("Failed to create leaderboard")?)
    }

    pub async fn update(
        &self,
        admin: &User,
        id: i64,
        input: UpdateLeaderboardInput,
    ) -> Result<Leaderboard, LeaderboardServiceError> {
        super::require_admin(admin).map_err(LeaderboardServiceError::Forbidden)?;
        let mut board = self.find(id).await?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(LeaderboardServiceError::validation("Leaderboard name is required"));
            }
            board.name = name;
        }
        if let Some(v) = input.leaderboard_type {
            board.leaderboard_type = v;
        }
        if let Some(v) = input.description {
            board.description = v;
        }
        if let Some(v) = input.is_active {
            board.is_active = v;
        }
        if input.start_date.is_some() {
            board.start_date = input.start_date;
        }
        if input.end_date.is_some() {
            board.end_date = input.end_date;
        }
        if input.student_class_id.is_some() {
            self.check_class(input.student_class_id).await?;
            board.student_class_id = input.student_class_id;
        }
        check_window(board.start_date, board.end_date)?;

        let board = self.repo.update(&board).await.context("Failed to update leaderboard")?;
        if let Err(e) = self.cache.delete(&keys::leaderboard(id)).await {
            tracing::warn!("Failed to evict cache: {:#}", e);
        }
        Ok(board)
    }

    pub async fn delete(&self, admin: &User, id: i64) -> Result<(), LeaderboardServiceError> {
        super::require_admin(admin).map_err(LeaderboardServiceError::Forbidden)?;
        self.find(id).await?;
        self.repo.delete(id).await.context("Failed to delete leaderboard")?;
        if let Err(e) = self.cache.delete(&keys::leaderboard(id)).await {
            tracing::warn!("Failed to evict cache: {:#}", e);
        }
        Ok(())
    }

    /// Drop the cached ranking and compute it again
    pub async fn refresh(&self, admin: &User, id: i64) -> Result<LeaderboardDetail, LeaderboardServiceError> {
        super::require_admin(admin).map_err(LeaderboardServiceError::Forbidden)?;
        let board = self.find(id).await?;
        if let Err(e) = self.cache.delete(&keys::leaderboard(id)).await {
            tracing::warn!("Failed to evict cache: {:#}", e);
        }
        tracing::info!("Refreshing leaderboard {} ({})", board.id, board.leaderboard_type);
        self.compute(board).await
    }

    /// Top users by points, by badge count and by streak
    pub async fn global_rankings(&self) -> Result<GlobalRankings, LeaderboardServiceError> {
        if let Some(rankings) = self
            .cache
            .get::<GlobalRankings>(keys::GLOBAL_RANKINGS)
            .await
            .ok()
            .flatten()
        {
            return Ok(rankings);
        }

        let ranked = |kind| RankQuery {
            kind,
            since: None,
            until: None,
            class_id: None,
            limit: RANKINGS_LIMIT,
        };
        let rankings = GlobalRankings {
            top_points: self
                .repo
                .rank(&ranked(LeaderboardType::GlobalPoints))
                .await
                .context("Failed to rank points")?,
            top_badges: self
                .gamification_repo
                .badge_leaderboard(RANKINGS_LIMIT)
                .await
                .context("Failed to rank badges")?,
            top_streaks: self
                .repo
                .rank(&ranked(LeaderboardType::CurrentStreak))
                .await
                .context("Failed to rank streaks")?,
        };
        if let Err(e) = self.cache.set(keys::GLOBAL_RANKINGS, &rankings, BOARD_TTL).await {
            tracing::warn!("Failed to write cache: {:#}", e);
        }
        Ok(rankings)
    }

    async fn compute(&self, board: Leaderboard) -> Result<LeaderboardDetail, LeaderboardServiceError> {
        let data = self
            .repo
            .rank(&rank_query(&board, Utc::now()))
            .await
            .context("Failed to rank leaderboard")?;
        self.repo
            .save_cached(board.id, &data)
            .await
            .context("Failed to save leaderboard data")?;
        if let Err(e) = self.cache.set(&keys::leaderboard(board.id), &data, BOARD_TTL).await {
            tracing::warn!("Failed to write cache: {:#}", e);
        }

        let board = Leaderboard {
            cached_data: data.clone(),
            last_updated: Some(Utc::now()),
            ..board
        };
        Ok(LeaderboardDetail { board, data })
    }

    async fn find(&self, id: i64) -> Result<Leaderboard, LeaderboardServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get leaderboard")?
            .ok_or_else(|| LeaderboardServiceError::not_found("Leaderboard", id))
    }

    /// Boards a viewer may open: inactive and foreign class boards are hidden
    async fn visible(&self, viewer: &User, id: i64) -> Result<Leaderboard, LeaderboardServiceError> {
        let board = self.find(id).await?;
        if viewer.is_admin() {
            return Ok(board);
        }
        if !board.is_active {
            return Err(LeaderboardServiceError::not_found("Leaderboard", id));
        }
        if let Some(class_id) = board.student_class_id {
            let teaches = self
                .class_repo
                .get_by_id(class_id)
                .await
                .context("Failed to get class")?
                .is_some_and(|class| class.teacher_id == viewer.id);
            let enrolled = self
                .class_repo
                .is_enrolled(class_id, viewer.id)
                .await
                .context("Failed to check enrollment")?;
            if !teaches && !enrolled {
                return Err(LeaderboardServiceError::not_found("Leaderboard", id));
            }
        }
        Ok(board)
    }

    async fn check_class(&self, class_id: Option<i64>) -> Result<(), LeaderboardServiceError> {
        if let Some(class_id) = class_id {
            self.class_repo
                .get_by_id(class_id)
                .await
                .context("Failed to get class")?
                .ok_or_else(|| LeaderboardServiceError::validation(format!("Class {} does not exist", class_id)))?;
        }
        Ok(())
    }
}
