//! Lesson repository
//!
//! Database operations for lessons, their tag and prerequisite links, and
//! lesson completions.
//!
//! This module provides:
//! - `LessonRepository` trait defining the interface for lesson data access
//! - `SqlxLessonRepository` implementing the trait for SQLite
//! - `insert_completion` for use inside the completion cascade transaction

use crate::models::{round1, Lesson, LessonCompletion, LessonFilter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::tag::{self, TagTarget};
use super::{like_pattern, parse_enum};

/// Lesson repository trait
#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// Create a lesson with its tags and prerequisites
    async fn create(&self, lesson: &Lesson, tag_ids: &[i64]) -> Result<Lesson>;

    /// Get lesson by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Lesson>>;

    /// Update a lesson; `tag_ids` replaces the tags when given
    async fn update(&self, lesson: &Lesson, tag_ids: Option<&[i64]>) -> Result<Lesson>;

    /// Delete a lesson
    async fn delete(&self, id: i64) -> Result<()>;

    /// List lessons matching the filter, ordered by sort order then newest
    async fn list(&self, filter: &LessonFilter, offset: i64, limit: i64) -> Result<(Vec<Lesson>, i64)>;

    /// Published and featured lessons
    async fn featured(&self, limit: i64) -> Result<Vec<Lesson>>;

    /// Check if a slug is taken by a lesson other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    /// Number of published lessons
    async fn count_published(&self) -> Result<i64>;

    /// A user's completion of one lesson, if any
    async fn get_completion(&self, user_id: i64, lesson_id: i64) -> Result<Option<LessonCompletion>>;

    /// A user's completions, newest first
    async fn completions_for_user(&self, user_id: i64) -> Result<Vec<LessonCompletion>>;

    /// How many published lessons the user has completed
    async fn count_completed_published(&self, user_id: i64) -> Result<i64>;
}

/// SQLx-based lesson repository implementation
pub struct SqlxLessonRepository {
    pool: SqlitePool,
}

impl SqlxLessonRepository {
    /// Create a new SQLx lesson repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn LessonRepository> {
        Arc::new(Self::new(pool))
    }

    /// Load tags and prerequisites for a batch of lessons
    async fn hydrate(&self, mut lessons: Vec<Lesson>) -> Result<Vec<Lesson>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        for lesson in lessons.iter_mut() {
            lesson.tags = tag::get_for(&mut conn, TagTarget::Lesson, lesson.id).await?;
            lesson.prerequisites = prerequisites(&mut conn, lesson.id).await?;
        }
        Ok(lessons)
    }
}

const LESSON_SELECT: &str = r#"
    SELECT l.id, l.title, l.slug, l.description, l.content, l.category_id, l.content_type,
           l.difficulty_level, l.estimated_duration, l.thumbnail, l.video_url, l.points_reward,
           l.author_id, l.is_published, l.is_featured, l.sort_order, l.published_at,
           l.created_at, l.updated_at,
           (SELECT COUNT(*) FROM lesson_completions lc WHERE lc.lesson_id = l.id) AS completion_count,
           (SELECT AVG(r.rating) FROM content_ratings r WHERE r.lesson_id = l.id) AS average_rating
    FROM lessons l
"#;

/// Append the WHERE clause for a lesson filter
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LessonFilter) {
    qb.push(" WHERE 1 = 1");
    if filter.published_only {
        qb.push(" AND l.is_published = 1");
    }
    if let Some(category) = filter.category {
        qb.push(" AND l.category_id = ").push_bind(category);
    }
    if let Some(difficulty) = filter.difficulty {
        qb.push(" AND l.difficulty_level = ").push_bind(difficulty.as_str());
    }
    if let Some(content_type) = filter.content_type {
        qb.push(" AND l.content_type = ").push_bind(content_type.as_str());
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND l.is_featured = ").push_bind(featured);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (l.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR l.description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

#[async_trait]
impl LessonRepository for SqlxLessonRepository {
    async fn create(&self, lesson: &Lesson, tag_ids: &[i64]) -> Result<Lesson> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO lessons (title, slug, description, content, category_id, content_type,
                                 difficulty_level, estimated_duration, thumbnail, video_url,
                                 points_reward, author_id, is_published, is_featured, sort_order,
                                 published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lesson.title)
        .bind(&lesson.slug)
        .bind(&lesson.description)
        .bind(&lesson.content)
        .bind(lesson.category_id)
        .bind(lesson.content_type.as_str())
        .bind(lesson.difficulty_level.as_str())
        .bind(lesson.estimated_duration)
        .bind(&lesson.thumbnail)
        .bind(&lesson.video_url)
        .bind(lesson.points_reward)
        .bind(lesson.author_id)
        .bind(lesson.is_published)
        .bind(lesson.is_featured)
        .bind(lesson.sort_order)
        .bind(lesson.published_at)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create lesson")?;
        let id = result.last_insert_rowid();

        replace_links(&mut tx, id, Some(tag_ids), &lesson.prerequisites).await?;
        tx.commit().await.context("Failed to commit lesson")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Lesson not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Lesson>> {
        let row = sqlx::query(&format!("{} WHERE l.id = ?", LESSON_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get lesson by ID")?;

        match row {
            Some(row) => {
                let lesson = row_to_lesson(&row)?;
                Ok(self.hydrate(vec![lesson]).await?.pop())
            }
            None => Ok(None),
        }
    }

    async fn update(&self, lesson: &Lesson, tag_ids: Option<&[i64]>) -> Result<Lesson> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            UPDATE lessons
            SET title = ?, slug = ?, description = ?, content = ?, category_id = ?, content_type = ?,
                difficulty_level = ?, estimated_duration = ?, thumbnail = ?, video_url = ?,
                points_reward = ?, is_published = ?, is_featured = ?, sort_order = ?,
                published_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&lesson.title)
        .bind(&lesson.slug)
        .bind(&lesson.description)
        .bind(&lesson.content)
        .bind(lesson.category_id)
        .bind(lesson.content_type.as_str())
        .bind(lesson.difficulty_level.as_str())
        .bind(lesson.estimated_duration)
        .bind(&lesson.thumbnail)
        .bind(&lesson.video_url)
        .bind(lesson.points_reward)
        .bind(lesson.is_published)
        .bind(lesson.is_featured)
        .bind(lesson.sort_order)
        .bind(lesson.published_at)
        .bind(Utc::now())
        .bind(lesson.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update lesson")?;

        replace_links(&mut tx, lesson.id, tag_ids, &lesson.prerequisites).await?;
        tx.commit().await.context("Failed to commit lesson update")?;

        self.get_by_id(lesson.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Lesson not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM lessons WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete lesson")?;
        Ok(())
    }

    async fn list(&self, filter: &LessonFilter, offset: i64, limit: i64) -> Result<(Vec<Lesson>, i64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM lessons l");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count lessons")?
            .get("count");

        let mut query = QueryBuilder::<Sqlite>::new(LESSON_SELECT);
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY l.sort_order ASC, l.created_at DESC, l.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list lessons")?;

        let lessons = rows.iter().map(row_to_lesson).collect::<Result<Vec<_>>>()?;
        Ok((self.hydrate(lessons).await?, total))
    }

    async fn featured(&self, limit: i64) -> Result<Vec<Lesson>> {
        let rows = sqlx::query(&format!(
            "{} WHERE l.is_published = 1 AND l.is_featured = 1 ORDER BY l.sort_order ASC, l.created_at DESC LIMIT ?",
            LESSON_SELECT
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list featured lessons")?;

        let lessons = rows.iter().map(row_to_lesson).collect::<Result<Vec<_>>>()?;
        self.hydrate(lessons).await
    }

    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM lessons WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check lesson slug")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn count_published(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM lessons WHERE is_published = 1")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count published lessons")?;
        Ok(row.get("count"))
    }

    async fn get_completion(&self, user_id: i64, lesson_id: i64) -> Result<Option<LessonCompletion>> {
        let row = sqlx::query(
            "SELECT id, user_id, lesson_id, completed_at, time_spent FROM lesson_completions WHERE user_id = ? AND lesson_id = ?",
        )
        .bind(user_id)
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get lesson completion")?;

        Ok(row.as_ref().map(row_to_completion))
    }

    async fn completions_for_user(&self, user_id: i64) -> Result<Vec<LessonCompletion>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, lesson_id, completed_at, time_spent
            FROM lesson_completions
            WHERE user_id = ?
            ORDER BY completed_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list lesson completions")?;

        Ok(rows.iter().map(row_to_completion).collect())
    }

    async fn count_completed_published(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM lesson_completions lc
            JOIN lessons l ON l.id = lc.lesson_id
            WHERE lc.user_id = ? AND l.is_published = 1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count completed lessons")?;
        Ok(row.get("count"))
    }
}

// ============================================================================
// Connection-level helpers
// ============================================================================

/// Record a completion. Returns `None` when the user already completed the lesson.
pub async fn insert_completion(
    conn: &mut SqliteConnection,
    user_id: i64,
    lesson_id: i64,
    time_spent: i64,
) -> Result<Option<LessonCompletion>> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO lesson_completions (user_id, lesson_id, completed_at, time_spent)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(lesson_id)
    .bind(now)
    .bind(time_spent)
    .execute(&mut *conn)
    .await
    .context("Failed to record lesson completion")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(LessonCompletion {
        id: result.last_insert_rowid(),
        user_id,
        lesson_id,
        completed_at: now,
        time_spent,
    }))
}

async fn prerequisites(conn: &mut SqliteConnection, lesson_id: i64) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT prerequisite_id FROM lesson_prerequisites WHERE lesson_id = ? ORDER BY prerequisite_id",
    )
    .bind(lesson_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load prerequisites")?;

    Ok(rows.iter().map(|row| row.get("prerequisite_id")).collect())
}

async fn replace_links(
    conn: &mut SqliteConnection,
    lesson_id: i64,
    tag_ids: Option<&[i64]>,
    prerequisite_ids: &[i64],
) -> Result<()> {
    if let Some(tag_ids) = tag_ids {
        sqlx::query("DELETE FROM lesson_tags WHERE lesson_id = ?")
            .bind(lesson_id)
            .execute(&mut *conn)
            .await
            .context("Failed to clear lesson tags")?;
        for tag_id in tag_ids {
            sqlx::query("INSERT OR IGNORE INTO lesson_tags (lesson_id, tag_id) VALUES (?, ?)")
                .bind(lesson_id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await
                .context("Failed to attach lesson tag")?;
        }
    }

    sqlx::query("DELETE FROM lesson_prerequisites WHERE lesson_id = ?")
        .bind(lesson_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear prerequisites")?;
    for prerequisite_id in prerequisite_ids.iter().filter(|id| **id != lesson_id) {
        sqlx::query(
            "INSERT OR IGNORE INTO lesson_prerequisites (lesson_id, prerequisite_id) VALUES (?, ?)",
        )
        .bind(lesson_id)
        .bind(prerequisite_id)
        .execute(&mut *conn)
        .await
        .context("Failed to attach prerequisite")?;
    }

    Ok(())
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_lesson(row: &SqliteRow) -> Result<Lesson> {
    let average_rating: Option<f64> = row.get("average_rating");
    Ok(Lesson {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
        content: row.get("content"),
        category_id: row.get("category_id"),
        tags: Vec::new(),
        content_type: parse_enum(row, "content_type")?,
        difficulty_level: parse_enum(row, "difficulty_level")?,
        estimated_duration: row.get("estimated_duration"),
        thumbnail: row.get("thumbnail"),
        video_url: row.get("video_url"),
        points_reward: row.get("points_reward"),
        author_id: row.get("author_id"),
        prerequisites: Vec::new(),
        is_published: row.get("is_published"),
        is_featured: row.get("is_featured"),
        sort_order: row.get("sort_order"),
        published_at: row.get("published_at"),
        completion_count: row.get("completion_count"),
        average_rating: average_rating.map(round1),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_completion(row: &SqliteRow) -> LessonCompletion {
    LessonCompletion {
        id: row.get("id"),
        user_id: row.get("user_id"),
        lesson_id: row.get("lesson_id"),
        completed_at: row.get("completed_at"),
        time_spent: row.get("time_spent"),
    }
}
