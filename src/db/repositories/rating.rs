//! Content rating repository
//!
//! Ratings of lessons and quizzes. Each row targets exactly one of the two;
//! a user rates a given item at most once.

use crate::models::{ContentRating, RatingTarget};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Content rating repository trait
#[async_trait]
pub trait RatingRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<ContentRating>>;

    /// List ratings, restricted to one user when `user_id` is given
    async fn list(&self, user_id: Option<i64>, offset: i64, limit: i64) -> Result<(Vec<ContentRating>, i64)>;

    /// The user's rating of a lesson or quiz
    async fn find(&self, user_id: i64, target: RatingTarget) -> Result<Option<ContentRating>>;

    /// Insert or replace the user's rating of a lesson or quiz
    async fn upsert(&self, user_id: i64, target: RatingTarget, rating: i64, review: &str) -> Result<ContentRating>;

    /// Change rating and review of an existing row
    async fn update(&self, id: i64, rating: i64, review: &str) -> Result<ContentRating>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based content rating repository implementation
pub struct SqlxRatingRepository {
    pool: SqlitePool,
}

impl SqlxRatingRepository {
    /// Create a new SQLx rating repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn RatingRepository> {
        Arc::new(Self::new(pool))
    }
}

const RATING_COLUMNS: &str = "id, user_id, lesson_id, quiz_id, rating, review, created_at, updated_at";

fn target_column(target: RatingTarget) -> (&'static str, i64) {
    match target {
        RatingTarget::Lesson(id) => ("lesson_id", id),
        RatingTarget::Quiz(id) => ("quiz_id", id),
    }
}

#[async_trait]
impl RatingRepository for SqlxRatingRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<ContentRating>> {
        let row = sqlx::query(&format!("SELECT {} FROM content_ratings WHERE id = ?", RATING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get rating")?;

        Ok(row.as_ref().map(row_to_rating))
    }

    async fn list(&self, user_id: Option<i64>, offset: i64, limit: i64) -> Result<(Vec<ContentRating>, i64)> {
        let scope = if user_id.is_some() { "WHERE user_id = ?" } else { "WHERE ? IS NULL" };

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM content_ratings {}", scope))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count ratings")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM content_ratings {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            RATING_COLUMNS, scope
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ratings")?;

        Ok((rows.iter().map(row_to_rating).collect(), total))
    }

    async fn find(&self, user_id: i64, target: RatingTarget) -> Result<Option<ContentRating>> {
        let (column, item_id) = target_column(target);
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_ratings WHERE user_id = ? AND {} = ?",
            RATING_COLUMNS, column
        ))
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find rating")?;

        Ok(row.as_ref().map(row_to_rating))
    }

    async fn upsert(&self, user_id: i64, target: RatingTarget, rating: i64, review: &str) -> Result<ContentRating> {
        if let Some(existing) = self.find(user_id, target).await? {
            return self.update(existing.id, rating, review).await;
        }

        let (column, item_id) = target_column(target);
        let now = Utc::now();
        let result = sqlx::query(&format!(
            "INSERT INTO content_ratings (user_id, {}, rating, review, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            column
        ))
        .bind(user_id)
        .bind(item_id)
        .bind(rating)
        .bind(review)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create rating")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Rating not found after insert"))
    }

    async fn update(&self, id: i64, rating: i64, review: &str) -> Result<ContentRating> {
        sqlx::query("UPDATE content_ratings SET rating = ?, review = ?, updated_at = ? WHERE id = ?")
            .bind(rating)
            .bind(review)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update rating")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Rating not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM content_ratings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete rating")?;
        Ok(())
    }
}

fn row_to_rating(row: &SqliteRow) -> ContentRating {
    ContentRating {
        id: row.get("id"),
        user_id: row.get("user_id"),
        lesson_id: row.get("lesson_id"),
        quiz_id: row.get("quiz_id"),
        rating: row.get("rating"),
        review: row.get("review"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
