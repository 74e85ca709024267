//! Badge service
//!
//! The badge catalog, the badges users hold and progress toward the rest.
//! Hidden badges stay out of listings until the viewer holds them; admins
//! see everything.

use crate::cache::Cache;
use crate::db::repositories::gamification::BadgeFilter;
use crate::db::repositories::{GamificationRepository, UserRepository};
use crate::models::{
    criteria_progress, Badge, BadgeInput, BadgeProgress, BadgeType, LeaderboardEntry, ListParams, PagedResult,
    Rarity, UpdateBadgeInput, User, UserBadge, MAX_TRANSACTION_POINTS,
};
use crate::services::gamification::{award_badge, invalidate_rankings};
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;

const BADGE_LEADERBOARD_LIMIT: i64 = 50;
/// Upper bound when a whole catalog is needed at once
const CATALOG_LIMIT: i64 = 1000;
/// The earn bonus is a tenth of this, so it always fits one ledger entry
pub const MAX_POINTS_REQUIRED: i64 = 10 * MAX_TRANSACTION_POINTS;

service_error!(
    /// Error types for badge operations
    BadgeServiceError
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardInput {
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwardResponse {
    pub detail: String,
    pub badge: Badge,
}

pub struct BadgeService {
    pool: SqlitePool,
    repo: Arc<dyn GamificationRepository>,
    user_repo: Arc<dyn UserRepository>,
    cache: Arc<Cache>,
}

fn check_badge(name: &str, points_required: i64, criteria: &serde_json::Value) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Badge name is required".to_string());
    }
    if points_required < 0 {
        return Err("points_required cannot be negative".to_string());
    }
    if points_required > MAX_POINTS_REQUIRED {
        return Err(format!("points_required cannot exceed {}", MAX_POINTS_REQUIRED));
    }
    if !criteria.is_object() {
        return Err("criteria must be a JSON object".to_string());
    }
    Ok(())
}

impl BadgeService {
    pub fn new(
        pool: SqlitePool,
        repo: Arc<dyn GamificationRepository>,
        user_repo: Arc<dyn UserRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            pool,
            repo,
            user_repo,
            cache,
        }
    }

    fn filter_for(viewer: Option<&User>, badge_type: Option<BadgeType>, rarity: Option<Rarity>) -> BadgeFilter {
        let holder_id = match viewer {
            Some(user) if user.is_admin() => None,
            Some(user) => Some(user.id),
            None => Some(0),
        };
        BadgeFilter {
            badge_type,
            rarity,
            holder_id,
        }
    }

    pub async fn list(
        &self,
        viewer: Option<&User>,
        badge_type: Option<BadgeType>,
        rarity: Option<Rarity>,
        params: &ListParams,
    ) -> Result<PagedResult<Badge>, BadgeServiceError> {
        let filter = Self::filter_for(viewer, badge_type, rarity);
        let (items, total) = self
            .repo
            .list_badges(&filter, params.offset(), params.limit())
            .await
            .context("Failed to list badges")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, viewer: Option<&User>, id: i64) -> Result<Badge, BadgeServiceError> {
        let badge = self
            .repo
            .get_badge(id)
            .await
            .context("Failed to get badge")?
            .ok_or_else(|| BadgeServiceError::not_found("Badge", id))?;

        let admin = viewer.is_some_and(User::is_admin);
        if admin {
            return Ok(badge);
        }
        let held = match viewer {
            Some(user) => self
                .repo
                .holds_badge(user.id, id)
                .await
                .context("Failed to check badge")?,
            None => false,
        };
        if !badge.is_active || (badge.is_hidden && !held) {
            return Err(BadgeServiceError::not_found("Badge", id));
        }
        Ok(badge)
    }

    pub async fn create(&self, admin: &User, input: BadgeInput) -> Result<Badge, BadgeServiceError> {
        super::require_admin(admin).map_err(BadgeServiceError::Forbidden)?;
        check_badge(&input.name, input.points_required, &input.criteria).map_err(BadgeServiceError::ValidationError)?;
        let name = input.name.trim().to_string();
        self.ensure_name_free(&name, 0).await?;

        let now = Utc::now();
        let badge = Badge {
            id: 0,
            name,
            description: input.description,
            icon: input.icon,
            badge_type: input.badge_type,
            rarity: input.rarity,
            rarity_color: input.rarity.color().to_string(),
            points_required: input.points_required,
            criteria: input.criteria,
            is_active: input.is_active,
            is_hidden: input.is_hidden,
            earned_count: 0,
            created_at: now,
            updated_at: now,
        };
        Ok(self.repo.create_badge(&badge).await.context("Failed to create badge")?)
    }

    pub async fn update(&self, admin: &User, id: i64, input: UpdateBadgeInput) -> Result<Badge, BadgeServiceError> {
        let mut badge = self.get(Some(admin), id).await?;
        super::require_admin(admin).map_err(BadgeServiceError::Forbidden)?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name != badge.name {
                self.ensure_name_free(&name, id).await?;
            }
            badge.name = name;
        }
        if let Some(v) = input.description {
            badge.description = v;
        }
        if let Some(v) = input.icon {
            badge.icon = v;
        }
        if let Some(v) = input.badge_type {
            badge.badge_type = v;
        }
        if let Some(v) = input.rarity {
            badge.rarity = v;
            badge.rarity_color = v.color().to_string();
        }
        if let Some(v) = input.points_required {
            badge.points_required = v;
        }
        if let Some(v) = input.criteria {
            badge.criteria = v;
        }
        if let Some(v) = input.is_active {
            badge.is_active = v;
        }
        if let Some(v) = input.is_hidden {
            badge.is_hidden = v;
        }
        check_badge(&badge.name, badge.points_required, &badge.criteria).map_err(BadgeServiceError::ValidationError)?;

        Ok(self.repo.update_badge(&badge).await.context("Failed to update badge")?)
    }

    pub async fn delete(&self, admin: &User, id: i64) -> Result<(), BadgeServiceError> {
        super::require_admin(admin).map_err(BadgeServiceError::Forbidden)?;
        self.get(Some(admin), id).await?;
        self.repo.delete_badge(id).await.context("Failed to delete badge")?;
        Ok(())
    }

    /// Badges the caller holds
    pub async fn earned(&self, user: &User) -> Result<Vec<UserBadge>, BadgeServiceError> {
        Ok(self
            .repo
            .user_badges(user.id)
            .await
            .context("Failed to load earned badges")?)
    }

    /// Progress toward every active badge the caller can see
    pub async fn progress(&self, user: &User) -> Result<Vec<BadgeProgress>, BadgeServiceError> {
        let filter = BadgeFilter {
            badge_type: None,
            rarity: None,
            holder_id: Some(user.id),
        };
        let (badges, _) = self
            .repo
            .list_badges(&filter, 0, CATALOG_LIMIT)
            .await
            .context("Failed to list badges")?;
        let held: HashSet<i64> = self
            .repo
            .user_badges(user.id)
            .await
            .context("Failed to load earned badges")?
            .iter()
            .map(|b| b.badge_id)
            .collect();
        let counts = self
            .repo
            .activity_counts(user.id)
            .await
            .context("Failed to count activity")?;

        Ok(badges
            .iter()
            .map(|badge| criteria_progress(badge, &counts, held.contains(&badge.id)))
            .collect())
    }

    /// Hand a badge to a user by hand
    pub async fn award(&self, admin: &User, id: i64, input: AwardInput) -> Result<AwardResponse, BadgeServiceError> {
        super::require_admin(admin).map_err(BadgeServiceError::Forbidden)?;
        let badge = self.get(Some(admin), id).await?;
        let user = self
            .user_repo
            .get_by_id(input.user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| BadgeServiceError::not_found("User", input.user_id))?;
        if self
            .repo
            .holds_badge(user.id, badge.id)
            .await
            .context("Failed to check badge")?
        {
            return Err(BadgeServiceError::validation(format!(
                "User already has the badge {}",
                badge.name
            )));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let outcome = award_badge(&mut *tx, user.id, badge.clone()).await?;
        tx.commit().await.context("Failed to commit badge award")?;
        invalidate_rankings(&self.cache, &outcome).await;

        tracing::info!("Admin {} awarded badge '{}' to user {}", admin.id, badge.name, user.id);
        Ok(AwardResponse {
            detail: format!("Badge {} awarded to {}", badge.name, user.email),
            badge,
        })
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, BadgeServiceError> {
        Ok(self
            .repo
            .badge_leaderboard(BADGE_LEADERBOARD_LIMIT)
            .await
            .context("Failed to build badge leaderboard")?)
    }

    // ========================================================================
    // User badges
    // ========================================================================

    pub async fn list_user_badges(
        &self,
        viewer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<UserBadge>, BadgeServiceError> {
        let scope = (!viewer.is_admin()).then_some(viewer.id);
        let (items, total) = self
            .repo
            .list_user_badges(scope, params.offset(), params.limit())
            .await
            .context("Failed to list user badges")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_user_badge(&self, viewer: &User, id: i64) -> Result<UserBadge, BadgeServiceError> {
        self.repo
            .get_user_badge(id)
            .await
            .context("Failed to get user badge")?
            .filter(|b| viewer.can_modify(b.user_id))
            .ok_or_else(|| BadgeServiceError::not_found("User badge", id))
    }

    pub async fn toggle_display(&self, viewer: &User, id: i64) -> Result<UserBadge, BadgeServiceError> {
        let held = self.get_user_badge(viewer, id).await?;
        Ok(self
            .repo
            .set_badge_displayed(id, !held.is_displayed)
            .await
            .context("Failed to update user badge")?)
    }

    async fn ensure_name_free(&self, name: &str, exclude_id: i64) -> Result<(), BadgeServiceError> {
        if self
            .repo
            .badge_name_exists(name, exclude_id)
            .await
            .context("Failed to check badge name")?
        {
            return Err(BadgeServiceError::Conflict(format!("Badge name already exists: {}", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{test_support, SqlxGamificationRepository, SqlxUserRepository};
    use crate::models::UserRole;
    use serde_json::json;

    fn service(pool: &SqlitePool) -> BadgeService {
        BadgeService::new(
            pool.clone(),
            SqlxGamificationRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()),
        )
    }

    fn secret() -> BadgeInput {
        BadgeInput {
            name: "Night Watch".to_string(),
            description: "A secret".to_string(),
            icon: "moon".to_string(),
            badge_type: BadgeType::Special,
            rarity: Rarity::Legendary,
            points_required: 200,
            criteria: json!({}),
            is_active: true,
            is_hidden: true,
        }
    }

    #[test]
    fn test_check_badge_bounds_points_required() {
        assert!(check_badge("Seed", 0, &json!({})).is_ok());
        assert!(check_badge("Seed", MAX_POINTS_REQUIRED, &json!({})).is_ok());
        assert!(check_badge("Seed", MAX_POINTS_REQUIRED + 1, &json!({})).is_err());
        assert!(check_badge("Seed", -1, &json!({})).is_err());
        assert!(check_badge(" ", 10, &json!({})).is_err());
        assert!(check_badge("Seed", 10, &json!([])).is_err());
    }

    #[tokio::test]
    async fn test_oversized_badge_is_rejected() {
        let pool = test_support::pool().await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let service = service(&pool);

        let mut input = secret();
        input.points_required = 100_001;
        assert!(matches!(
            service.create(&admin, input).await,
            Err(BadgeServiceError::ValidationError(_))
        ));

        let mut input = secret();
        input.points_required = 100_000;
        assert_eq!(service.create(&admin, input).await.unwrap().points_required, 100_000);
    }

    #[tokio::test]
    async fn test_hidden_badges_and_award() {
        let pool = test_support::pool().await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let service = service(&pool);

        assert!(matches!(
            service.create(&student, secret()).await,
            Err(BadgeServiceError::Forbidden(_))
        ));
        let badge = service.create(&admin, secret()).await.unwrap();
        assert_eq!(badge.rarity_color, "#F59E0B");
        assert!(matches!(
            service.create(&admin, secret()).await,
            Err(BadgeServiceError::Conflict(_))
        ));

        let seeded = service.list(None, None, None, &ListParams::default()).await.unwrap().total;
        assert_eq!(
            service.list(Some(&admin), None, None, &ListParams::default()).await.unwrap().total,
            seeded + 1
        );
        assert!(service.get(Some(&student), badge.id).await.is_err());

        assert!(matches!(
            service.award(&admin, badge.id, AwardInput { user_id: 9999 }).await,
            Err(BadgeServiceError::NotFound(_))
        ));
        service
            .award(&admin, badge.id, AwardInput { user_id: student.id })
            .await
            .unwrap();
        assert!(matches!(
            service.award(&admin, badge.id, AwardInput { user_id: student.id }).await,
            Err(BadgeServiceError::ValidationError(_))
        ));

        // held now, so visible; the bonus is a tenth of points_required
        assert!(service.get(Some(&student), badge.id).await.is_ok());
        let profile = SqlxUserRepository::new(pool.clone())
            .get_profile(student.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.total_points, 20);

        let earned = service.earned(&student).await.unwrap();
        assert_eq!(earned.len(), 1);
        let toggled = service.toggle_display(&student, earned[0].id).await.unwrap();
        assert_eq!(toggled.is_displayed, !earned[0].is_displayed);

        let board = service.leaderboard().await.unwrap();
        assert_eq!(board[0].user_id, student.id);
    }

    #[tokio::test]
    async fn test_progress_reports_each_visible_badge() {
        let pool = test_support::pool().await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let service = service(&pool);

        let progress = service.progress(&student).await.unwrap();
        assert!(!progress.is_empty());
        let first_steps = progress.iter().find(|p| p.badge.name == "First Steps").unwrap();
        assert!(!first_steps.is_earned);
        assert_eq!(first_steps.progress_percentage, 0.0);
        assert_eq!(first_steps.next_milestone.as_deref(), Some("lessons_completed: 0/1"));
    }
}
