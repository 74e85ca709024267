//! Gamification statistics
//!
//! Per-user dashboards and the admin-wide summary. The daily login bonus
//! is on `GamificationService` because it writes.

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::{GamificationRepository, UserRepository};
use crate::models::{LeaderboardEntry, RecentBadgeEarner, SystemTotals, TypeTotal, User, UserBadge};
use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

const RECENT_BADGES: usize = 5;
const TOP_EARNERS: i64 = 10;
const RECENT_EARNERS: i64 = 10;
const RANK_TTL: Duration = Duration::from_secs(300);

service_error!(
    /// Error types for statistics
    StatsServiceError
);

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub total_points: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub badges_earned: i64,
    pub lessons_completed: i64,
    pub quizzes_completed: i64,
    pub challenges_solved: i64,
    /// `None` until the user has points
    pub global_rank: Option<i64>,
    pub weekly_points: i64,
    pub monthly_points: i64,
    pub level: i64,
    pub level_progress: f64,
    pub recent_badges: Vec<UserBadge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSummary {
    #[serde(flatten)]
    pub totals: SystemTotals,
    pub top_earners: Vec<LeaderboardEntry>,
    pub recent_badge_earners: Vec<RecentBadgeEarner>,
    pub points_by_type: Vec<TypeTotal>,
    pub badges_by_rarity: Vec<TypeTotal>,
    pub achievements_by_type: Vec<TypeTotal>,
}

pub struct StatsService {
    repo: Arc<dyn GamificationRepository>,
    user_repo: Arc<dyn UserRepository>,
    cache: Arc<Cache>,
}

impl StatsService {
    pub fn new(repo: Arc<dyn GamificationRepository>, user_repo: Arc<dyn UserRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, user_repo, cache }
    }

    pub async fn user_stats(&self, user: &User) -> Result<UserStats, StatsServiceError> {
        let profile = self
            .user_repo
            .get_profile(user.id)
            .await
            .context("Failed to get profile")?
            .ok_or_else(|| StatsServiceError::not_found("Profile for user", user.id))?;
        let counts = self
            .repo
            .activity_counts(user.id)
            .await
            .context("Failed to count activity")?;
        let badges = self
            .repo
            .user_badges(user.id)
            .await
            .context("Failed to load badges")?;

        let now = Utc::now();
        let weekly_points = self
            .repo
            .points_between(user.id, now - ChronoDuration::days(7), None)
            .await
            .context("Failed to sum weekly points")?;
        let monthly_points = self
            .repo
            .points_between(user.id, now - ChronoDuration::days(30), None)
            .await
            .context("Failed to sum monthly points")?;

        Ok(UserStats {
            total_points: profile.total_points,
            current_streak: profile.streak_days,
            longest_streak: profile.longest_streak,
            badges_earned: badges.len() as i64,
            lessons_completed: counts.lessons_completed,
            quizzes_completed: counts.quizzes_completed,
            challenges_solved: counts.challenges_solved,
            global_rank: self.global_rank(user.id, profile.total_points).await?,
            weekly_points,
            monthly_points,
            level: profile.level,
            level_progress: profile.level_progress(),
            recent_badges: badges.into_iter().take(RECENT_BADGES).collect(),
        })
    }

    pub async fn system_summary(&self, admin: &User) -> Result<SystemSummary, StatsServiceError> {
        super::require_admin(admin).map_err(StatsServiceError::Forbidden)?;

        Ok(SystemSummary {
            totals: self.repo.system_totals().await.context("Failed to load totals")?,
            top_earners: self
                .repo
                .ledger_leaderboard(TOP_EARNERS)
                .await
                .context("Failed to rank earners")?,
            recent_badge_earners: self
                .repo
                .recent_badge_earners(RECENT_EARNERS)
                .await
                .context("Failed to load badge earners")?,
            points_by_type: self
                .repo
                .points_by_type(None)
                .await
                .context("Failed to group points")?,
            badges_by_rarity: self
                .repo
                .badges_by_rarity()
                .await
                .context("Failed to group badges")?,
            achievements_by_type: self
                .repo
                .achievements_by_type(None)
                .await
                .context("Failed to group achievements")?,
        })
    }

    /// 1 + users with more points
    async fn global_rank(&self, user_id: i64, total_points: i64) -> Result<Option<i64>, StatsServiceError> {
        if total_points <= 0 {
            return Ok(None);
        }
        let key = keys::user_rank(user_id);
        if let Some(rank) = self.cache.get::<i64>(&key).await.ok().flatten() {
            return Ok(Some(rank));
        }
        let ahead = self
            .repo
            .users_ahead(total_points)
            .await
            .context("Failed to rank user")?;
        let rank = ahead + 1;
        if let Err(e) = self.cache.set(&key, &rank, RANK_TTL).await {
            tracing::warn!("Failed to write cache: {:#}", e);
        }
        Ok(Some(rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{test_support, SqlxGamificationRepository, SqlxUserRepository};
    use crate::models::{NewTransaction, TransactionType, UserRole};
    use crate::services::gamification::{invalidate_rankings, record};
    use sqlx::SqlitePool;

    fn service(pool: &SqlitePool, cache: Arc<Cache>) -> StatsService {
        StatsService::new(
            SqlxGamificationRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            cache,
        )
    }

    #[tokio::test]
    async fn test_user_stats_rank_follows_the_ledger() {
        let pool = test_support::pool().await;
        let alice = test_support::user(&pool, "alice@example.com", UserRole::Student).await;
        let bob = test_support::user(&pool, "bob@example.com", UserRole::Student).await;
        let cache = create_cache(&CacheConfig::default());
        let service = service(&pool, cache.clone());

        let fresh = service.user_stats(&alice).await.unwrap();
        assert_eq!(fresh.total_points, 0);
        assert_eq!(fresh.global_rank, None);
        assert_eq!(fresh.level, 1);

        let mut conn = pool.acquire().await.unwrap();
        let entry = NewTransaction::new(alice.id, 40, TransactionType::AdminAdjustment, "Grant", "");
        let outcome = record(&mut conn, entry).await.unwrap();
        invalidate_rankings(&cache, &outcome).await;
        let entry = NewTransaction::new(bob.id, 80, TransactionType::AdminAdjustment, "Grant", "");
        let outcome = record(&mut conn, entry).await.unwrap();
        drop(conn);
        invalidate_rankings(&cache, &outcome).await;

        let stats = service.user_stats(&alice).await.unwrap();
        assert_eq!(stats.total_points, 40);
        assert_eq!(stats.weekly_points, 40);
        assert_eq!(stats.monthly_points, 40);
        assert_eq!(stats.global_rank, Some(2));
        assert_eq!(service.user_stats(&bob).await.unwrap().global_rank, Some(1));
    }

    #[tokio::test]
    async fn test_system_summary_is_admin_only() {
        let pool = test_support::pool().await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let service = service(&pool, create_cache(&CacheConfig::default()));

        assert!(matches!(
            service.system_summary(&student).await,
            Err(StatsServiceError::Forbidden(_))
        ));
        let summary = service.system_summary(&admin).await.unwrap();
        assert_eq!(summary.totals.total_users, 2);
        assert!(summary.top_earners.is_empty());
    }
}
