//! Tag service
//!
//! Tags are shared by lessons, quizzes and challenges. Reading is public,
//! writing needs a teacher or admin.

use crate::db::repositories::TagRepository;
use crate::models::{ListParams, PagedResult, Tag, User};
use crate::services::slug::unique_slug;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

service_error!(
    /// Error types for tag service operations
    TagServiceError
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInput {
    pub name: String,
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<Tag>, TagServiceError> {
        let (items, total) = self
            .repo
            .list(params.offset(), params.limit())
            .await
            .context("Failed to list tags")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, id: i64) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get tag")?
            .ok_or_else(|| TagServiceError::not_found("Tag", id))
    }

    pub async fn create(&self, user: &User, input: TagInput) -> Result<Tag, TagServiceError> {
        super::require_staff(user).map_err(TagServiceError::Forbidden)?;
        let name = self.checked_name(&input.name, 0).await?;

        let repo = &self.repo;
        let slug = unique_slug(&name, "tag", |s| async move { repo.slug_exists(&s, 0).await })
            .await
            .context("Failed to generate slug")?;

        Ok(self
            .repo
            .create(&Tag::new(name, slug))
            .await
            .context("Failed to create tag")?)
    }

    pub async fn update(&self, user: &User, id: i64, input: TagInput) -> Result<Tag, TagServiceError> {
        super::require_staff(user).map_err(TagServiceError::Forbidden)?;
        let mut tag = self.get(id).await?;
        let name = self.checked_name(&input.name, id).await?;

        if name != tag.name {
            let repo = &self.repo;
            tag.slug = unique_slug(&name, "tag", |s| async move { repo.slug_exists(&s, id).await })
                .await
                .context("Failed to generate slug")?;
            tag.name = name;
        }

        Ok(self.repo.update(&tag).await.context("Failed to update tag")?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> Result<(), TagServiceError> {
        super::require_staff(user).map_err(TagServiceError::Forbidden)?;
        self.get(id).await?;
        self.repo.delete(id).await.context("Failed to delete tag")?;
        Ok(())
    }

    async fn checked_name(&self, name: &str, exclude_id: i64) -> Result<String, TagServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TagServiceError::validation("Tag name is required"));
        }
        if self
            .repo
            .name_exists(name, exclude_id)
            .await
            .context("Failed to check tag name")?
        {
            return Err(TagServiceError::Conflict(format!("Tag already exists: {}", name)));
        }
        Ok(name.to_string())
    }
}

/// Fail unless every id names an existing tag
pub(crate) async fn ensure_tags_exist(repo: &dyn TagRepository, ids: &[i64]) -> Result<(), String> {
    let mut unique = ids.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let found = repo
        .count_existing(&unique)
        .await
        .map_err(|e| format!("Failed to check tags: {}", e))?;
    if found as usize != unique.len() {
        return Err("One or more tags do not exist".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{test_support, SqlxTagRepository};
    use crate::models::UserRole;

    fn input(name: &str) -> TagInput {
        TagInput {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_tag_crud() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let service = TagService::new(SqlxTagRepository::boxed(pool.clone()));

        let tag = service.create(&teacher, input("Solar Power")).await.unwrap();
        assert_eq!(tag.slug, "solar-power");

        assert!(matches!(
            service.create(&teacher, input("Solar Power")).await,
            Err(TagServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.create(&student, input("Wind")).await,
            Err(TagServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.create(&teacher, input("   ")).await,
            Err(TagServiceError::ValidationError(_))
        ));

        let renamed = service.update(&teacher, tag.id, input("Solar")).await.unwrap();
        assert_eq!(renamed.slug, "solar");

        service.delete(&teacher, tag.id).await.unwrap();
        assert!(service.get(tag.id).await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_tags_exist() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let repo = SqlxTagRepository::boxed(pool.clone());
        let service = TagService::new(repo.clone());

        let a = service.create(&teacher, input("Water")).await.unwrap();
        let b = service.create(&teacher, input("Air")).await.unwrap();

        assert!(ensure_tags_exist(repo.as_ref(), &[a.id, b.id, a.id]).await.is_ok());
        assert!(ensure_tags_exist(repo.as_ref(), &[a.id, 999]).await.is_err());
        assert!(ensure_tags_exist(repo.as_ref(), &[]).await.is_ok());
    }
}
