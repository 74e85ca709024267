//! Lesson service
//!
//! Students and anonymous visitors see published lessons only. Completing a
//! lesson for the first time runs the lesson award cascade inside the same
//! transaction as the completion row.

use crate::cache::Cache;
use crate::db::repositories::lesson::insert_completion;
use crate::db::repositories::{CategoryRepository, LessonRepository, RatingRepository, TagRepository};
use crate::models::{
    percentage, ContentRating, Lesson, LessonCompletion, LessonFilter, LessonInput, ListParams, PagedResult,
    RatingTarget, UpdateLessonInput, User,
};
use crate::services::gamification::{self, invalidate_rankings};
use crate::services::slug::unique_slug;
use crate::services::tag::ensure_tags_exist;
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

const FEATURED_LIMIT: i64 = 10;

service_error!(
    /// Error types for lesson operations
    LessonServiceError
);

/// Result of marking a lesson complete
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    pub detail: String,
    pub points_earned: i64,
    pub completion: LessonCompletion,
}

/// Lesson progress of one learner
#[derive(Debug, Clone, Serialize)]
pub struct LessonProgress {
    pub completed_lessons: Vec<LessonCompletion>,
    pub total_lessons: i64,
    pub completed_count: i64,
    pub progress_percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteInput {
    /// Minutes
    pub time_spent: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateInput {
    pub rating: i64,
    #[serde(default)]
    pub review: String,
}

pub struct LessonService {
    pool: SqlitePool,
    repo: Arc<dyn LessonRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    tag_repo: Arc<dyn TagRepository>,
    rating_repo: Arc<dyn RatingRepository>,
    cache: Arc<Cache>,
}

impl LessonService {
    pub fn new(
        pool: SqlitePool,
        repo: Arc<dyn LessonRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        tag_repo: Arc<dyn TagRepository>,
        rating_repo: Arc<dyn RatingRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            pool,
            repo,
            category_repo,
            tag_repo,
            rating_repo,
            cache,
        }
    }

    pub async fn list(
        &self,
        viewer: Option<&User>,
        mut filter: LessonFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Lesson>, LessonServiceError> {
        filter.published_only = !super::sees_drafts(viewer);
        let (items, total) = self
            .repo
            .list(&filter, params.offset(), params.limit())
            .await
            .context("Failed to list lessons")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, viewer: Option<&User>, id: i64) -> Result<Lesson, LessonServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get lesson")?
            .filter(|l| l.is_published || super::sees_drafts(viewer))
            .ok_or_else(|| LessonServiceError::not_found("Lesson", id))
    }

    pub async fn featured(&self) -> Result<Vec<Lesson>, LessonServiceError> {
        Ok(self
            .repo
            .featured(FEATURED_LIMIT)
            .await
            .context("Failed to load featured lessons")?)
    }

    pub async fn create(&self, author: &User, input: LessonInput) -> Result<Lesson, LessonServiceError> {
        super::require_staff(author).map_err(LessonServiceError::Forbidden)?;

        let title = checked_title(&input.title)?;
        check_ranges(input.estimated_duration, input.points_reward)?;
        self.ensure_category(input.category_id).await?;
        ensure_tags_exist(self.tag_repo.as_ref(), &input.tag_ids)
            .await
            .map_err(LessonServiceError::ValidationError)?;
        let prerequisites = self.checked_prerequisites(&input.prerequisite_ids, 0).await?;

        let repo = &self.repo;
        let slug = unique_slug(&title, "lesson", |s| async move { repo.slug_exists(&s, 0).await })
            .await
            .context("Failed to generate slug")?;

        let now = Utc::now();
        let lesson = Lesson {
            id: 0,
            title,
            slug,
            description: input.description,
            content: input.content,
            category_id: input.category_id,
            tags: Vec::new(),
            content_type: input.content_type,
            difficulty_level: input.difficulty_level,
            estimated_duration: input.estimated_duration,
            thumbnail: input.thumbnail,
            video_url: input.video_url,
            points_reward: input.points_reward,
            author_id: author.id,
            prerequisites,
            is_published: input.is_published,
            is_featured: input.is_featured,
            sort_order: input.sort_order,
            published_at: input.is_published.then_some(now),
            completion_count: 0,
            average_rating: None,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .repo
            .create(&lesson, &input.tag_ids)
            .await
            .context("Failed to create lesson")?;
        tracing::info!("Lesson {} '{}' created by {}", created.id, created.title, author.id);
        Ok(created)
    }

    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: UpdateLessonInput,
    ) -> Result<Lesson, LessonServiceError> {
        let mut lesson = self.authored(user, id).await?;

        if let Some(title) = input.title {
            let title = checked_title(&title)?;
            if title != lesson.title {
                let repo = &self.repo;
                lesson.slug = unique_slug(&title, "lesson", |s| async move { repo.slug_exists(&s, id).await })
                    .await
                    .context("Failed to generate slug")?;
                lesson.title = title;
            }
        }
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
            lesson.category_id = category_id;
        }
        if let Some(tag_ids) = &input.tag_ids {
            ensure_tags_exist(self.tag_repo.as_ref(), tag_ids)
                .await
                .map_err(LessonServiceError::ValidationError)?;
        }
        if let Some(ids) = &input.prerequisite_ids {
            lesson.prerequisites = self.checked_prerequisites(ids, id).await?;
        }
        if let Some(v) = input.description {
            lesson.description = v;
        }
        if let Some(v) = input.content {
            lesson.content = v;
        }
        if let Some(v) = input.content_type {
            lesson.content_type = v;
        }
        if let Some(v) = input.difficulty_level {
            lesson.difficulty_level = v;
        }
        if let Some(v) = input.estimated_duration {
            lesson.estimated_duration = v;
        }
        if let Some(v) = input.thumbnail {
            lesson.thumbnail = v;
        }
        if let Some(v) = input.video_url {
            lesson.video_url = v;
        }
        if let Some(v) = input.points_reward {
            lesson.points_reward = v;
        }
        if let Some(v) = input.is_featured {
            lesson.is_featured = v;
        }
        if let Some(v) = input.sort_order {
            lesson.sort_order = v;
        }
        if let Some(v) = input.is_published {
            lesson.is_published = v;
        }
        check_ranges(lesson.estimated_duration, lesson.points_reward)?;

        if lesson.is_published && lesson.published_at.is_none() {
            lesson.published_at = Some(Utc::now());
        }

        Ok(self
            .repo
            .update(&lesson, input.tag_ids.as_deref())
            .await
            .context("Failed to update lesson")?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> Result<(), LessonServiceError> {
        self.authored(user, id).await?;
        self.repo.delete(id).await.context("Failed to delete lesson")?;
        Ok(())
    }

    /// Record a completion; the first one earns the lesson's points
    pub async fn complete(
        &self,
        user: &User,
        id: i64,
        input: CompleteInput,
    ) -> Result<CompletionResponse, LessonServiceError> {
        let lesson = self.get(Some(user), id).await?;
        let time_spent = input.time_spent.unwrap_or(0);
        if time_spent < 0 {
            return Err(LessonServiceError::validation("time_spent cannot be negative"));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let Some(completion) = insert_completion(&mut *tx, user.id, id, time_spent).await? else {
            tx.rollback().await.context("Failed to roll back")?;
            let existing = self
                .repo
                .get_completion(user.id, id)
                .await
                .context("Failed to load completion")?
                .ok_or_else(|| anyhow::anyhow!("Completion vanished for lesson {}", id))?;
            return Ok(CompletionResponse {
                detail: "Lesson already completed".to_string(),
                points_earned: 0,
                completion: existing,
            });
        };

        let outcome = gamification::lesson_completed(&mut *tx, user.id, &lesson, Utc::now().date_naive()).await?;
        tx.commit().await.context("Failed to commit transaction")?;
        invalidate_rankings(&self.cache, &outcome).await;

        tracing::debug!("User {} completed lesson {}", user.id, id);
        Ok(CompletionResponse {
            detail: "Lesson completed".to_string(),
            points_earned: lesson.points_reward,
            completion,
        })
    }

    /// Rate a completed lesson, replacing any earlier rating
    pub async fn rate(&self, user: &User, id: i64, input: RateInput) -> Result<ContentRating, LessonServiceError> {
        self.get(Some(user), id).await?;
        super::rating::check_rating(input.rating).map_err(LessonServiceError::ValidationError)?;
        if self
            .repo
            .get_completion(user.id, id)
            .await
            .context("Failed to load completion")?
            .is_none()
        {
            return Err(LessonServiceError::validation(
                "You must complete the lesson before rating it",
            ));
        }

        Ok(self
            .rating_repo
            .upsert(user.id, RatingTarget::Lesson(id), input.rating, &input.review)
            .await
            .context("Failed to save rating")?)
    }

    pub async fn my_progress(&self, user: &User) -> Result<LessonProgress, LessonServiceError> {
        let total_lessons = self
            .repo
            .count_published()
            .await
            .context("Failed to count lessons")?;
        let completed_count = self
            .repo
            .count_completed_published(user.id)
            .await
            .context("Failed to count completions")?;

        Ok(LessonProgress {
            completed_lessons: self
                .repo
                .completions_for_user(user.id)
                .await
                .context("Failed to load completions")?,
            total_lessons,
            completed_count,
            progress_percentage: percentage(completed_count, total_lessons),
        })
    }

    /// The lesson, if `user` is staff and its author or an admin
    async fn authored(&self, user: &User, id: i64) -> Result<Lesson, LessonServiceError> {
        super::require_staff(user).map_err(LessonServiceError::Forbidden)?;
        let lesson = self.get(Some(user), id).await?;
        if !user.can_modify(lesson.author_id) {
            return Err(LessonServiceError::forbidden(
                "Only the author or an admin can change this lesson",
            ));
        }
        Ok(lesson)
    }

    async fn ensure_category(&self, id: i64) -> Result<(), LessonServiceError> {
        self.category_repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| LessonServiceError::validation(format!("Category {} does not exist", id)))?;
        Ok(())
    }

    async fn checked_prerequisites(&self, ids: &[i64], lesson_id: i64) -> Result<Vec<i64>, LessonServiceError> {
        let mut unique = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        for &id in &unique {
            if id == lesson_id {
                return Err(LessonServiceError::validation("A lesson cannot be its own prerequisite"));
            }
            if self.repo.get_by_id(id).await.context("Failed to get lesson")?.is_none() {
                return Err(LessonServiceError::validation(format!(
                    "Prerequisite lesson {} does not exist",
                    id
                )));
            }
        }
        Ok(unique)
    }
}

fn checked_title(title: &str) -> Result<String, LessonServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(LessonServiceError::validation("Title is required"));
    }
    Ok(title.to_string())
}

fn check_ranges(estimated_duration: i64, points_reward: i64) -> Result<(), LessonServiceError> {
    if !(1..=300).contains(&estimated_duration) {
        return Err(LessonServiceError::validation(
            "Estimated duration must be between 1 and 300 minutes",
        ));
    }
    if !(1..=100).contains(&points_reward) {
        return Err(LessonServiceError::validation(
            "Points reward must be between 1 and 100",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{
        test_support, SqlxCategoryRepository, SqlxLessonRepository, SqlxRatingRepository, SqlxTagRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::models::{ContentType, Difficulty, UserRole};

    fn service(pool: &SqlitePool) -> LessonService {
        LessonService::new(
            pool.clone(),
            SqlxLessonRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
            SqlxRatingRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()),
        )
    }

    fn input(title: &str, category_id: i64, published: bool) -> LessonInput {
        LessonInput {
            title: title.to_string(),
            description: "Intro".to_string(),
            content: "Body".to_string(),
            category_id,
            tag_ids: Vec::new(),
            content_type: ContentType::Text,
            difficulty_level: Difficulty::Beginner,
            estimated_duration: 15,
            thumbnail: String::new(),
            video_url: String::new(),
            points_reward: 10,
            prerequisite_ids: Vec::new(),
            is_published: published,
            is_featured: false,
            sort_order: 0,
        }
    }

    #[tokio::test]
    async fn test_drafts_hidden_from_students() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let category = test_support::category(&pool, "Energy").await;
        let service = service(&pool);

        let draft = service.create(&teacher, input("Wind Power", category, false)).await.unwrap();
        assert!(draft.published_at.is_none());
        service.create(&teacher, input("Solar Power", category, true)).await.unwrap();

        let anonymous = service.list(None, LessonFilter::default(), &ListParams::default()).await.unwrap();
        assert_eq!(anonymous.total, 1);
        let staff = service
            .list(Some(&teacher), LessonFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(staff.total, 2);

        assert!(matches!(
            service.get(Some(&student), draft.id).await,
            Err(LessonServiceError::NotFound(_))
        ));

        let published = service
            .update(
                &teacher,
                draft.id,
                UpdateLessonInput {
                    is_published: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(published.published_at.is_some());
        assert!(service.get(Some(&student), draft.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_validation_and_permissions() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let other = test_support::user(&pool, "o@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let category = test_support::category(&pool, "Energy").await;
        let service = service(&pool);

        assert!(matches!(
            service.create(&student, input("Nope", category, true)).await,
            Err(LessonServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.create(&teacher, input("Bad category", 999, true)).await,
            Err(LessonServiceError::ValidationError(_))
        ));
        let mut too_long = input("Marathon", category, true);
        too_long.estimated_duration = 301;
        assert!(service.create(&teacher, too_long).await.is_err());

        let lesson = service.create(&teacher, input("Recycling", category, true)).await.unwrap();
        let again = service.create(&teacher, input("Recycling", category, true)).await.unwrap();
        assert_eq!(again.slug, "recycling-2");

        assert!(matches!(
            service.delete(&other, lesson.id).await,
            Err(LessonServiceError::Forbidden(_))
        ));
        service.delete(&teacher, lesson.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_awards_once() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let category = test_support::category(&pool, "Energy").await;
        let service = service(&pool);
        let lesson = service.create(&teacher, input("Composting", category, true)).await.unwrap();

        let first = service
            .complete(&student, lesson.id, CompleteInput { time_spent: Some(12) })
            .await
            .unwrap();
        assert_eq!(first.points_earned, 10);
        assert_eq!(first.completion.time_spent, 12);

        let second = service
            .complete(&student, lesson.id, CompleteInput::default())
            .await
            .unwrap();
        assert_eq!(second.points_earned, 0);
        assert_eq!(second.detail, "Lesson already completed");

        // lesson reward plus the first-lesson achievement
        let profile = SqlxUserRepository::new(pool.clone())
            .get_profile(student.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.total_points, 35);
        assert_eq!(profile.streak_days, 1);

        let progress = service.my_progress(&student).await.unwrap();
        assert_eq!(progress.completed_count, 1);
        assert_eq!(progress.total_lessons, 1);
        assert_eq!(progress.progress_percentage, 100.0);
    }

    #[tokio::test]
    async fn test_rate_requires_completion() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let category = test_support::category(&pool, "Energy").await;
        let service = service(&pool);
        let lesson = service.create(&teacher, input("Water", category, true)).await.unwrap();

        let rate = |rating| RateInput {
            rating,
            review: String::new(),
        };
        assert!(service.rate(&student, lesson.id, rate(4)).await.is_err());

        service
            .complete(&student, lesson.id, CompleteInput::default())
            .await
            .unwrap();
        assert!(service.rate(&student, lesson.id, rate(6)).await.is_err());
        service.rate(&student, lesson.id, rate(4)).await.unwrap();
        let updated = service.rate(&student, lesson.id, rate(5)).await.unwrap();
        assert_eq!(updated.rating, 5);

        let lesson = service.get(None, lesson.id).await.unwrap();
        assert_eq!(lesson.average_rating, Some(5.0));
    }
}
