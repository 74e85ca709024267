//! Category service
//!
//! Categories are public to read; teachers and admins maintain them.
//! Slugs follow the name and stay unique by suffixing.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CategoryInput, ListParams, PagedResult, User};
use crate::services::slug::unique_slug;
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Default cache TTL for categories (1 hour)
const CATEGORY_CACHE_TTL_SECS: u64 = 3600;

const CACHE_KEY_CATEGORY_BY_ID: &str = "category:id:";
const CACHE_KEY_PATTERN: &str = "category:*";

static COLOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid color regex"));

service_error!(
    /// Error types for category service operations
    CategoryServiceError
);

/// Category service for the content taxonomy
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self {
            repo,
            cache,
            cache_ttl: Duration::from_secs(CATEGORY_CACHE_TTL_SECS),
        }
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<Category>, CategoryServiceError> {
        let (items, total) = self
            .repo
            .list(params.offset(), params.limit())
            .await
            .context("Failed to list categories")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, id: i64) -> Result<Category, CategoryServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_CATEGORY_BY_ID, id);
        if let Some(category) = self.cache.get::<Category>(&cache_key).await.ok().flatten() {
            return Ok(category);
        }

        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category by ID")?
            .ok_or_else(|| CategoryServiceError::not_found("Category", id))?;

        if let Err(e) = self.cache.set(&cache_key, &category, self.cache_ttl).await {
            tracing::warn!("Failed to write cache: {:#}", e);
        }
        Ok(category)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?
            .ok_or_else(|| CategoryServiceError::NotFound(format!("Category not found: {}", slug)))
    }

    pub async fn create(&self, user: &User, input: CategoryInput) -> Result<Category, CategoryServiceError> {
        super::require_staff(user).map_err(CategoryServiceError::Forbidden)?;

        let name = input
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CategoryServiceError::validation("Category name is required"))?
            .to_string();
        self.ensure_name_free(&name, 0).await?;

        let repo = &self.repo;
        let slug = unique_slug(&name, "category", |s| async move { repo.slug_exists(&s, 0).await })
            .await
            .context("Failed to generate slug")?;

        let mut category = Category::new(name, slug);
        apply(&mut category, input)?;

        let created = self.repo.create(&category).await.context("Failed to create category")?;
        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn update(&self, user: &User, id: i64, input: CategoryInput) -> Result<Category, CategoryServiceError> {
        super::require_staff(user).map_err(CategoryServiceError::Forbidden)?;
        let mut category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::not_found("Category", id))?;

        if let Some(name) = input.name.as_deref().map(str::trim) {
            if name.is_empty() {
                return Err(CategoryServiceError::validation("Category name is required"));
            }
            if name != category.name {
                self.ensure_name_free(name, id).await?;
                let repo = &self.repo;
                category.slug = unique_slug(name, "category", |s| async move { repo.slug_exists(&s, id).await })
                    .await
                    .context("Failed to generate slug")?;
                category.name = name.to_string();
            }
        }
        apply(&mut category, input)?;

        let updated = self.repo.update(&category).await.context("Failed to update category")?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    /// Deleting a category removes its lessons and quizzes; challenges keep
    /// existing without a category.
    pub async fn delete(&self, user: &User, id: i64) -> Result<(), CategoryServiceError> {
        super::require_staff(user).map_err(CategoryServiceError::Forbidden)?;
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::not_found("Category", id))?;

        self.repo.delete(id).await.context("Failed to delete category")?;
        self.invalidate_cache().await;
        tracing::info!("Category {} deleted by user {}", id, user.id);
        Ok(())
    }

    async fn ensure_name_free(&self, name: &str, exclude_id: i64) -> Result<(), CategoryServiceError> {
        if self
            .repo
            .name_exists(name, exclude_id)
            .await
            .context("Failed to check name uniqueness")?
        {
            return Err(CategoryServiceError::Conflict(format!(
                "Category name already exists: {}",
                name
            )));
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_KEY_PATTERN).await {
            tracing::warn!("Failed to evict cache: {:#}", e);
        }
    }
}

/// Copy the optional descriptive fields onto a category
fn apply(category: &mut Category, input: CategoryInput) -> Result<(), CategoryServiceError> {
    if let Some(description) = input.description {
        category.description = description;
    }
    if let Some(icon) = input.icon {
        category.icon = icon;
    }
    if let Some(color) = input.color {
        if !COLOR_RE.is_match(&color) {
            return Err(CategoryServiceError::validation(
                "Color must be a hex value such as #007bff",
            ));
        }
        category.color = color;
    }
    if let Some(is_active) = input.is_active {
        category.is_active = is_active;
    }
    Ok(())
}
