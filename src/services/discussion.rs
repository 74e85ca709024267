//! Challenge discussion service

use crate::db::repositories::{ChallengeRepository, DiscussionRepository};
use crate::models::{ChallengeDiscussion, DiscussionInput, ListParams, PagedResult, User};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

service_error!(
    /// Error types for discussion operations
    DiscussionServiceError
);

fn checked_content(content: Option<String>) -> Result<String, DiscussionServiceError> {
    content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DiscussionServiceError::validation("Content is required"))
}

pub struct DiscussionService {
    repo: Arc<dyn DiscussionRepository>,
    challenge_repo: Arc<dyn ChallengeRepository>,
}

impl DiscussionService {
    pub fn new(repo: Arc<dyn DiscussionRepository>, challenge_repo: Arc<dyn ChallengeRepository>) -> Self {
        Self { repo, challenge_repo }
    }

    /// Approved top-level posts with their replies
    pub async fn list(
        &self,
        challenge_id: Option<i64>,
        params: &ListParams,
    ) -> Result<PagedResult<ChallengeDiscussion>, DiscussionServiceError> {
        let (items, total) = self
            .repo
            .list_top_level(challenge_id, params.offset(), params.limit())
            .await
            .context("Failed to list discussions")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, id: i64) -> Result<ChallengeDiscussion, DiscussionServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get discussion")?
            .ok_or_else(|| DiscussionServiceError::not_found("Discussion", id))
    }

    pub async fn create(&self, user: &User, input: DiscussionInput) -> Result<ChallengeDiscussion, DiscussionServiceError> {
        let challenge_id = input
            .challenge_id
            .ok_or_else(|| DiscussionServiceError::validation("challenge_id is required"))?;
        self.challenge_repo
            .get_by_id(challenge_id)
            .await
            .context("Failed to get challenge")?
            .ok_or_else(|| DiscussionServiceError::validation(format!("Challenge {} does not exist", challenge_id)))?;

        let post = new_post(user.id, challenge_id, None, input)?;
        Ok(self.repo.create(&post).await.context("Failed to create discussion")?)
    }

    /// Reply to a post; the reply joins the post's challenge
    pub async fn reply(
        &self,
        user: &User,
        id: i64,
        input: DiscussionInput,
    ) -> Result<ChallengeDiscussion, DiscussionServiceError> {
        let parent = self.get(id).await?;
        let post = new_post(user.id, parent.challenge_id, Some(parent.id), input)?;
        Ok(self.repo.create(&post).await.context("Failed to create reply")?)
    }

    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: DiscussionInput,
    ) -> Result<ChallengeDiscussion, DiscussionServiceError> {
        let mut post = self.owned(user, id).await?;
        if input.content.is_some() {
            post.content = checked_content(input.content)?;
        }
        if let Some(v) = input.is_solution {
            post.is_solution = v;
        }
        if let Some(v) = input.is_spoiler {
            post.is_spoiler = v;
        }
        Ok(self.repo.update(&post).await.context("Failed to update discussion")?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> Result<(), DiscussionServiceError> {
        self.owned(user, id).await?;
        self.repo.delete(id).await.context("Failed to delete discussion")?;
        Ok(())
    }

    /// Any signed-in user may flag a post for moderation
    pub async fn flag(&self, user: &User, id: i64) -> Result<(), DiscussionServiceError> {
        self.get(id).await?;
        self.repo.flag(id).await.context("Failed to flag discussion")?;
        tracing::info!("Discussion {} flagged by user {}", id, user.id);
        Ok(())
    }

    async fn owned(&self, user: &User, id: i64) -> Result<ChallengeDiscussion, DiscussionServiceError> {
        let post = self.get(id).await?;
        if !user.can_modify(post.user_id) {
            return Err(DiscussionServiceError::forbidden(
                "Only the author or an admin can change this post",
            ));
        }
        Ok(post)
    }
}

fn new_post(
    user_id: i64,
    challenge_id: i64,
    parent_id: Option<i64>,
    input: DiscussionInput,
) -> Result<ChallengeDiscussion, DiscussionServiceError> {
    let now = Utc::now();
    Ok(ChallengeDiscussion {
        id: 0,
        challenge_id,
        user_id,
        parent_id,
        content: checked_content(input.content)?,
        is_solution: input.is_solution.unwrap_or(false),
        is_spoiler: input.is_spoiler.unwrap_or(false),
        is_approved: true,
        is_flagged: false,
        replies: Vec::new(),
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::challenge::tests::new_challenge;
    use crate::db::repositories::{test_support, SqlxChallengeRepository, SqlxDiscussionRepository};
    use crate::models::UserRole;

    fn post(challenge_id: Option<i64>, content: &str) -> DiscussionInput {
        DiscussionInput {
            challenge_id,
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_threads_and_permissions() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let alice = test_support::user(&pool, "alice@example.com", UserRole::Student).await;
        let bob = test_support::user(&pool, "bob@example.com", UserRole::Student).await;
        let challenges = SqlxChallengeRepository::boxed(pool.clone());
        let challenge = challenges.create(&new_challenge("Sum It", teacher.id), &[]).await.unwrap();
        let service = DiscussionService::new(SqlxDiscussionRepository::boxed(pool.clone()), challenges);

        assert!(service.create(&alice, post(None, "Hi")).await.is_err());
        assert!(service.create(&alice, post(Some(999), "Hi")).await.is_err());
        assert!(service.create(&alice, post(Some(challenge.id), "  ")).await.is_err());

        let thread = service.create(&alice, post(Some(challenge.id), "How do I parse input?")).await.unwrap();
        let reply = service.reply(&bob, thread.id, post(None, "Split on spaces")).await.unwrap();
        assert_eq!(reply.parent_id, Some(thread.id));
        assert_eq!(reply.challenge_id, challenge.id);

        let listed = service.list(Some(challenge.id), &ListParams::default()).await.unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.items[0].replies.len(), 1);

        assert!(matches!(
            service.update(&bob, thread.id, post(None, "edited")).await,
            Err(DiscussionServiceError::Forbidden(_))
        ));
        let edited = service.update(&alice, thread.id, post(None, "edited")).await.unwrap();
        assert_eq!(edited.content, "edited");

        service.flag(&bob, thread.id).await.unwrap();
        assert!(service.get(thread.id).await.unwrap().is_flagged);

        service.delete(&alice, thread.id).await.unwrap();
        assert!(service.get(thread.id).await.is_err());
    }
}
