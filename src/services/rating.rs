//! Content rating service
//!
//! Ratings of lessons and quizzes. Each belongs to exactly one of the two,
//! and a user rates a given lesson or quiz at most once.

use crate::db::repositories::{LessonRepository, QuizRepository, RatingRepository};
use crate::models::{ContentRating, ListParams, PagedResult, RatingInput, RatingTarget, User};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

service_error!(
    /// Error types for rating operations
    RatingServiceError
);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRatingInput {
    pub rating: Option<i64>,
    pub review: Option<String>,
}

/// Ratings are whole stars from 1 to 5
pub(crate) fn check_rating(rating: i64) -> Result<(), String> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err("Rating must be between 1 and 5".to_string())
    }
}

pub struct RatingService {
    repo: Arc<dyn RatingRepository>,
    lesson_repo: Arc<dyn LessonRepository>,
    quiz_repo: Arc<dyn QuizRepository>,
}

impl RatingService {
    pub fn new(
        repo: Arc<dyn RatingRepository>,
        lesson_repo: Arc<dyn LessonRepository>,
        quiz_repo: Arc<dyn QuizRepository>,
    ) -> Self {
        Self {
            repo,
            lesson_repo,
            quiz_repo,
        }
    }

    /// Own ratings, or all of them for admins
    pub async fn list(&self, viewer: &User, params: &ListParams) -> Result<PagedResult<ContentRating>, RatingServiceError> {
        let scope = (!viewer.is_admin()).then_some(viewer.id);
        let (items, total) = self
            .repo
            .list(scope, params.offset(), params.limit())
            .await
            .context("Failed to list ratings")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, viewer: &User, id: i64) -> Result<ContentRating, RatingServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get rating")?
            .filter(|r| viewer.can_modify(r.user_id))
            .ok_or_else(|| RatingServiceError::not_found("Rating", id))
    }

    pub async fn create(&self, user: &User, input: RatingInput) -> Result<ContentRating, RatingServiceError> {
        let target = input
            .target()
            .ok_or_else(|| RatingServiceError::validation("Rate exactly one of lesson_id or quiz_id"))?;
        check_rating(input.rating).map_err(RatingServiceError::ValidationError)?;

        let exists = match target {
            RatingTarget::Lesson(id) => self
                .lesson_repo
                .get_by_id(id)
                .await
                .context("Failed to get lesson")?
                .is_some(),
            RatingTarget::Quiz(id) => self
                .quiz_repo
                .get_by_id(id)
                .await
                .context("Failed to get quiz")?
                .is_some(),
        };
        if !exists {
            return Err(RatingServiceError::validation("The rated content does not exist"));
        }

        if self
            .repo
            .find(user.id, target)
            .await
            .context("Failed to look up rating")?
            .is_some()
        {
            return Err(RatingServiceError::Conflict(
                "You have already rated this content".to_string(),
            ));
        }

        Ok(self
            .repo
            .upsert(user.id, target, input.rating, &input.review)
            .await
            .context("Failed to save rating")?)
    }

    pub async fn update(
        &self,
        viewer: &User,
        id: i64,
        input: UpdateRatingInput,
    ) -> Result<ContentRating, RatingServiceError> {
        let current = self.get(viewer, id).await?;
        let rating = input.rating.unwrap_or(current.rating);
        check_rating(rating).map_err(RatingServiceError::ValidationError)?;
        let review = input.review.unwrap_or(current.review);

        Ok(self
            .repo
            .update(id, rating, &review)
            .await
            .context("Failed to update rating")?)
    }

    pub async fn delete(&self, viewer: &User, id: i64) -> Result<(), RatingServiceError> {
        self.get(viewer, id).await?;
        self.repo.delete(id).await.context("Failed to delete rating")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::lesson::tests::new_lesson;
    use crate::db::repositories::{
        test_support, SqlxLessonRepository, SqlxQuizRepository, SqlxRatingRepository,
    };
    use crate::models::UserRole;

    #[test]
    fn test_check_rating() {
        assert!(check_rating(1).is_ok());
        assert!(check_rating(5).is_ok());
        assert!(check_rating(0).is_err());
        assert!(check_rating(6).is_err());
    }

    #[tokio::test]
    async fn test_rating_rules() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let other = test_support::user(&pool, "o@example.com", UserRole::Student).await;
        let category = test_support::category(&pool, "Energy").await;

        let lesson_repo = SqlxLessonRepository::boxed(pool.clone());
        let lesson = lesson_repo
            .create(&new_lesson("Wind", category, teacher.id), &[])
            .await
            .unwrap();
        let service = RatingService::new(
            SqlxRatingRepository::boxed(pool.clone()),
            lesson_repo,
            SqlxQuizRepository::boxed(pool.clone()),
        );

        let both = RatingInput {
            lesson_id: Some(lesson.id),
            quiz_id: Some(1),
            rating: 4,
            review: String::new(),
        };
        assert!(matches!(
            service.create(&student, both).await,
            Err(RatingServiceError::ValidationError(_))
        ));

        let input = RatingInput {
            lesson_id: Some(lesson.id),
            quiz_id: None,
            rating: 4,
            review: "Clear".to_string(),
        };
        let rating = service.create(&student, input.clone()).await.unwrap();
        assert!(matches!(
            service.create(&student, input).await,
            Err(RatingServiceError::Conflict(_))
        ));

        assert!(matches!(
            service.get(&other, rating.id).await,
            Err(RatingServiceError::NotFound(_))
        ));
        assert_eq!(service.list(&other, &ListParams::default()).await.unwrap().total, 0);

        let updated = service
            .update(
                &student,
                rating.id,
                UpdateRatingInput {
                    rating: Some(2),
                    review: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.rating, 2);
        assert_eq!(updated.review, "Clear");

        service.delete(&student, rating.id).await.unwrap();
        assert!(service.get(&student, rating.id).await.is_err());
    }
}
