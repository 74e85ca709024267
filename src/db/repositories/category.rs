//! Category repository
//!
//! Database operations for content categories.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite
//!
//! Lesson and quiz counts only include published content.

use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// List categories ordered by name
    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Category>, i64)>;

    /// Update an existing category
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category (cascades to its lessons and quizzes)
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a slug is taken by a category other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    /// Check if a name is taken by a category other than `exclude_id`
    async fn name_exists(&self, name: &str, exclude_id: i64) -> Result<bool>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: SqlitePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

const CATEGORY_SELECT: &str = r#"
    SELECT c.id, c.name, c.slug, c.description, c.icon, c.color, c.is_active,
           c.created_at, c.updated_at,
           (SELECT COUNT(*) FROM lessons l WHERE l.category_id = c.id AND l.is_published = 1) AS lesson_count,
           (SELECT COUNT(*) FROM quizzes q WHERE q.category_id = c.id AND q.is_published = 1) AS quiz_count
    FROM categories c
"#;

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO categories (name, slug, description, icon, color, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(category.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create category")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let row = sqlx::query(&format!("{} WHERE c.id = ?", CATEGORY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by ID")?;

        Ok(row.as_ref().map(row_to_category))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let row = sqlx::query(&format!("{} WHERE c.slug = ?", CATEGORY_SELECT))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get category by slug")?;

        Ok(row.as_ref().map(row_to_category))
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Category>, i64)> {
        let count_row = sqlx::query("SELECT COUNT(*) AS count FROM categories")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count categories")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!("{} ORDER BY c.name ASC LIMIT ? OFFSET ?", CATEGORY_SELECT))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list categories")?;

        Ok((rows.iter().map(row_to_category).collect(), total))
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        sqlx::query(
            r#"
            UPDATE categories
            SET name = ?, slug = ?, description = ?, icon = ?, color = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(&category.icon)
        .bind(&category.color)
        .bind(category.is_active)
        .bind(Utc::now())
        .bind(category.id)
        .execute(&self.pool)
        .await
        .context("Failed to update category")?;

        self.get_by_id(category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete category")?;
        Ok(())
    }

    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM categories WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check category slug")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn name_exists(&self, name: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM categories WHERE LOWER(name) = LOWER(?) AND id != ?",
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check category name")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }
}

fn row_to_category(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        icon: row.get("icon"),
        color: row.get("color"),
        is_active: row.get("is_active"),
        lesson_count: row.get("lesson_count"),
        quiz_count: row.get("quiz_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
