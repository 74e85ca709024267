//! Challenge discussion repository

use crate::models::ChallengeDiscussion;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Discussion repository trait
#[async_trait]
pub trait DiscussionRepository: Send + Sync {
    async fn create(&self, discussion: &ChallengeDiscussion) -> Result<ChallengeDiscussion>;

    /// Get a post with its approved replies
    async fn get_by_id(&self, id: i64) -> Result<Option<ChallengeDiscussion>>;

    /// Approved top-level posts, optionally for one challenge, with replies nested
    async fn list_top_level(
        &self,
        challenge_id: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ChallengeDiscussion>, i64)>;

    /// Update content and flags
    async fn update(&self, discussion: &ChallengeDiscussion) -> Result<ChallengeDiscussion>;

    /// Delete a post and its replies
    async fn delete(&self, id: i64) -> Result<()>;

    async fn flag(&self, id: i64) -> Result<()>;
}

/// SQLx-based discussion repository implementation
pub struct SqlxDiscussionRepository {
    pool: SqlitePool,
}

impl SqlxDiscussionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: SqlitePool) -> Arc<dyn DiscussionRepository> {
        Arc::new(Self::new(pool))
    }

    async fn replies(&self, parent_id: i64) -> Result<Vec<ChallengeDiscussion>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM challenge_discussions WHERE parent_id = ? AND is_approved = 1 ORDER BY created_at ASC, id ASC",
            DISCUSSION_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load replies")?;

        Ok(rows.iter().map(row_to_discussion).collect())
    }
}

const DISCUSSION_COLUMNS: &str = "id, challenge_id, user_id, parent_id, content, is_solution, \
     is_spoiler, is_approved, is_flagged, created_at, updated_at";

#[async_trait]
impl DiscussionRepository for SqlxDiscussionRepository {
    async fn create(&self, discussion: &ChallengeDiscussion) -> Result<ChallengeDiscussion> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO challenge_discussions (challenge_id, user_id, parent_id, content, is_solution,
                                               is_spoiler, is_approved, is_flagged, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(discussion.challenge_id)
        .bind(discussion.user_id)
        .bind(discussion.parent_id)
        .bind(&discussion.content)
        .bind(discussion.is_solution)
        .bind(discussion.is_spoiler)
        .bind(discussion.is_approved)
        .bind(discussion.is_flagged)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create discussion")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Discussion not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ChallengeDiscussion>> {
        let row = sqlx::query(&format!("SELECT {} FROM challenge_discussions WHERE id = ?", DISCUSSION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get discussion")?;

        match row {
            Some(row) => {
                let mut discussion = row_to_discussion(&row);
                discussion.replies = self.replies(discussion.id).await?;
                Ok(Some(discussion))
            }
            None => Ok(None),
        }
    }

    async fn list_top_level(
        &self,
        challenge_id: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ChallengeDiscussion>, i64)> {
        let scope = "WHERE parent_id IS NULL AND is_approved = 1 AND (? IS NULL OR challenge_id = ?)";

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM challenge_discussions {}", scope))
            .bind(challenge_id)
            .bind(challenge_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count discussions")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM challenge_discussions {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            DISCUSSION_COLUMNS, scope
        ))
        .bind(challenge_id)
        .bind(challenge_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list discussions")?;

        let mut discussions: Vec<ChallengeDiscussion> = rows.iter().map(row_to_discussion).collect();
        for discussion in discussions.iter_mut() {
            discussion.replies = self.replies(discussion.id).await?;
        }

        Ok((discussions, total))
    }

    async fn update(&self, discussion: &ChallengeDiscussion) -> Result<ChallengeDiscussion> {
        sqlx::query(
            r#"
            UPDATE challenge_discussions
            SET content = ?, is_solution = ?, is_spoiler = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&discussion.content)
        .bind(discussion.is_solution)
        .bind(discussion.is_spoiler)
        .bind(Utc::now())
        .bind(discussion.id)
        .execute(&self.pool)
        .await
        .context("Failed to update discussion")?;

        self.get_by_id(discussion.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Discussion not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM challenge_discussions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete discussion")?;
        Ok(())
    }

    async fn flag(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE challenge_discussions SET is_flagged = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to flag discussion")?;
        Ok(())
    }
}

fn row_to_discussion(row: &SqliteRow) -> ChallengeDiscussion {
    ChallengeDiscussion {
        id: row.get("id"),
        challenge_id: row.get("challenge_id"),
        user_id: row.get("user_id"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        is_solution: row.get("is_solution"),
        is_spoiler: row.get("is_spoiler"),
        is_approved: row.get("is_approved"),
        is_flagged: row.get("is_flagged"),
        replies: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::challenge::tests::new_challenge;
    use crate::db::repositories::test_support;
    use crate::db::repositories::{ChallengeRepository, SqlxChallengeRepository};
    use crate::models::UserRole;

    fn post(challenge_id: i64, user_id: i64, parent_id: Option<i64>, content: &str) -> ChallengeDiscussion {
        let now = Utc::now();
        ChallengeDiscussion {
            id: 0,
            challenge_id,
            user_id,
            parent_id,
            content: content.to_string(),
            is_solution: false,
            is_spoiler: false,
            is_approved: true,
            is_flagged: false,
            replies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_threads_nest_replies() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let challenge = SqlxChallengeRepository::new(pool.clone())
            .create(&new_challenge("Sum It", author.id), &[])
            .await
            .unwrap();

        let repo = SqlxDiscussionRepository::new(pool);
        let root = repo.create(&post(challenge.id, student.id, None, "How?")).await.unwrap();
        repo.create(&post(challenge.id, author.id, Some(root.id), "Like this")).await.unwrap();
        let mut hidden = post(challenge.id, author.id, Some(root.id), "Removed");
        hidden.is_approved = false;
        repo.create(&hidden).await.unwrap();

        let (threads, total) = repo.list_top_level(Some(challenge.id), 0, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(threads[0].replies.len(), 1);
        assert_eq!(threads[0].replies[0].content, "Like this");

        repo.flag(root.id).await.unwrap();
        assert!(repo.get_by_id(root.id).await.unwrap().unwrap().is_flagged);

        repo.delete(root.id).await.unwrap();
        assert_eq!(repo.list_top_level(None, 0, 20).await.unwrap().1, 0);
    }
}
