//! Tag repository
//!
//! Database operations for tags and their links to lessons, quizzes and
//! challenges.
//!
//! This module provides:
//! - `TagRepository` trait defining the interface for tag data access
//! - `SqlxTagRepository` implementing the trait for SQLite
//! - `TagTarget` naming the junction table used for a content type

use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Content that can carry tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagTarget {
    Lesson,
    Quiz,
    Challenge,
}

impl TagTarget {
    fn table(&self) -> &'static str {
        match self {
            TagTarget::Lesson => "lesson_tags",
            TagTarget::Quiz => "quiz_tags",
            TagTarget::Challenge => "challenge_tags",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            TagTarget::Lesson => "lesson_id",
            TagTarget::Quiz => "quiz_id",
            TagTarget::Challenge => "challenge_id",
        }
    }
}

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    /// Get tag by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Get tag by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// List tags ordered by name
    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Tag>, i64)>;

    /// Rename a tag
    async fn update(&self, tag: &Tag) -> Result<Tag>;

    /// Delete a tag
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a slug is taken by a tag other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    /// Check if a name is taken by a tag other than `exclude_id`
    async fn name_exists(&self, name: &str, exclude_id: i64) -> Result<bool>;

    /// Count how many of `ids` exist
    async fn count_existing(&self, ids: &[i64]) -> Result<i64>;

    /// Tags attached to one item
    async fn get_for(&self, target: TagTarget, item_id: i64) -> Result<Vec<Tag>>;

    /// Replace the tags attached to one item
    async fn set_for(&self, target: TagTarget, item_id: i64, tag_ids: &[i64]) -> Result<()>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: SqlitePool,
}

impl SqlxTagRepository {
    /// Create a new SQLx tag repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let now = Utc::now();
        let result = sqlx::query("INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)")
            .bind(&tag.name)
            .bind(&tag.slug)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to create tag")?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            name: tag.name.clone(),
            slug: tag.slug.clone(),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tag by ID")?;

        Ok(row.as_ref().map(row_to_tag))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get tag by slug")?;

        Ok(row.as_ref().map(row_to_tag))
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Tag>, i64)> {
        let count_row = sqlx::query("SELECT COUNT(*) AS count FROM tags")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count tags")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(
            "SELECT id, name, slug, created_at FROM tags ORDER BY name ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tags")?;

        Ok((rows.iter().map(row_to_tag).collect(), total))
    }

    async fn update(&self, tag: &Tag) -> Result<Tag> {
        sqlx::query("UPDATE tags SET name = ?, slug = ? WHERE id = ?")
            .bind(&tag.name)
            .bind(&tag.slug)
            .bind(tag.id)
            .execute(&self.pool)
            .await
            .context("Failed to update tag")?;

        self.get_by_id(tag.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Tag not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete tag")?;
        Ok(())
    }

    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM tags WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check tag slug")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn name_exists(&self, name: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM tags WHERE LOWER(name) = LOWER(?) AND id != ?",
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check tag name")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn count_existing(&self, ids: &[i64]) -> Result<i64> {
        let mut found = 0;
        for id in ids {
            if self.get_by_id(*id).await?.is_some() {
                found += 1;
            }
        }
        Ok(found)
    }

    async fn get_for(&self, target: TagTarget, item_id: i64) -> Result<Vec<Tag>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        get_for(&mut conn, target, item_id).await
    }

    async fn set_for(&self, target: TagTarget, item_id: i64, tag_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", target.table(), target.column()))
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear tags")?;

        for tag_id in tag_ids {
            sqlx::query(&format!(
                "INSERT OR IGNORE INTO {} ({}, tag_id) VALUES (?, ?)",
                target.table(),
                target.column()
            ))
            .bind(item_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach tag")?;
        }

        tx.commit().await.context("Failed to commit tags")?;
        Ok(())
    }
}

/// Tags attached to one item, on an existing connection
pub async fn get_for(conn: &mut SqliteConnection, target: TagTarget, item_id: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT t.id, t.name, t.slug, t.created_at
        FROM tags t
        JOIN {table} j ON j.tag_id = t.id
        WHERE j.{column} = ?
        ORDER BY t.name ASC
        "#,
        table = target.table(),
        column = target.column()
    ))
    .bind(item_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to get tags")?;

    Ok(rows.iter().map(row_to_tag).collect())
}

fn row_to_tag(row: &SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support;
    use crate::models::UserRole;

    #[tokio::test]
    async fn test_create_and_lookup_tag() {
        let pool = test_support::pool().await;
        let repo = SqlxTagRepository::new(pool);

        let tag = repo
            .create(&Tag::new("Solar".to_string(), "solar".to_string()))
            .await
            .unwrap();

        assert_eq!(repo.get_by_slug("solar").await.unwrap().map(|t| t.id), Some(tag.id));
        assert!(repo.slug_exists("solar", 0).await.unwrap());
        assert!(repo.name_exists("SOLAR", 0).await.unwrap());
        assert_eq!(repo.count_existing(&[tag.id, 999]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_tags_replaces_links() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let category_id = test_support::category(&pool, "Energy").await;
        let now = Utc::now();
        let lesson_id = sqlx::query(
            "INSERT INTO lessons (title, slug, category_id, author_id, created_at, updated_at) VALUES ('L', 'l', ?, ?, ?, ?)",
        )
        .bind(category_id)
        .bind(author.id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

        let repo = SqlxTagRepository::new(pool);
        let wind = repo.create(&Tag::new("Wind".to_string(), "wind".to_string())).await.unwrap();
        let solar = repo.create(&Tag::new("Solar".to_string(), "solar".to_string())).await.unwrap();

        repo.set_for(TagTarget::Lesson, lesson_id, &[wind.id, solar.id]).await.unwrap();
        let tags = repo.get_for(TagTarget::Lesson, lesson_id).await.unwrap();
        assert_eq!(tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["Solar", "Wind"]);

        repo.set_for(TagTarget::Lesson, lesson_id, &[wind.id]).await.unwrap();
        assert_eq!(repo.get_for(TagTarget::Lesson, lesson_id).await.unwrap().len(), 1);
        assert!(repo.get_for(TagTarget::Quiz, lesson_id).await.unwrap().is_empty());
    }
}
