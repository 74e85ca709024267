//! Submission repository
//!
//! Storage for challenge submissions. Writes that change the accepted set
//! also recount the challenge counters in the same transaction.

use crate::models::{EvaluationInput, Submission, SubmissionFilter, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::challenge::refresh_counters;
use super::{parse_enum, parse_json};

/// Submission repository trait
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Store a new submission and recount the challenge
    async fn create(&self, submission: &Submission) -> Result<Submission>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Submission>>;

    /// Role-scoped listing: admins see all, teachers their own plus those to
    /// their challenges, students their own
    async fn list(
        &self,
        viewer: &User,
        filter: &SubmissionFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Submission>, i64)>;

    /// One user's submissions to one challenge, newest first
    async fn for_user_challenge(
        &self,
        user_id: i64,
        challenge_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Submission>, i64)>;

    /// Most recent submissions of a user across challenges
    async fn recent_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Submission>>;

    /// Whether the user has submitted to the challenge at all
    async fn has_submitted(&self, user_id: i64, challenge_id: i64) -> Result<bool>;

    /// Delete a submission and recount the challenge
    async fn delete(&self, id: i64) -> Result<()>;

    /// Put a submission back to pending, clearing its evaluation
    async fn reset_pending(&self, id: i64) -> Result<Submission>;
}

/// SQLx-based submission repository implementation
pub struct SqlxSubmissionRepository {
    pool: SqlitePool,
}

impl SqlxSubmissionRepository {
    /// Create a new SQLx submission repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn SubmissionRepository> {
        Arc::new(Self::new(pool))
    }
}

const SUBMISSION_COLUMNS: &str = "s.id, s.user_id, s.challenge_id, s.code, s.language, s.status, \
     s.score, s.execution_time, s.memory_used, s.test_results, s.passed_test_cases, \
     s.total_test_cases, s.error_message, s.compilation_output, s.points_earned, s.xp_earned, \
     s.submitted_at, s.evaluated_at";

fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, viewer: &User, filter: &SubmissionFilter) {
    qb.push(" WHERE 1 = 1");
    match viewer.role {
        UserRole::Admin => {}
        UserRole::Teacher => {
            qb.push(" AND (s.user_id = ")
                .push_bind(viewer.id)
                .push(" OR s.challenge_id IN (SELECT id FROM challenges WHERE author_id = ")
                .push_bind(viewer.id)
                .push("))");
        }
        UserRole::Student => {
            qb.push(" AND s.user_id = ").push_bind(viewer.id);
        }
    }
    if let Some(challenge) = filter.challenge {
        qb.push(" AND s.challenge_id = ").push_bind(challenge);
    }
    if let Some(language) = filter.language {
        qb.push(" AND s.language = ").push_bind(language.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND s.status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl SubmissionRepository for SqlxSubmissionRepository {
    async fn create(&self, submission: &Submission) -> Result<Submission> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            INSERT INTO submissions (user_id, challenge_id, code, language, status, score,
                                     test_results, submitted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(submission.user_id)
        .bind(submission.challenge_id)
        .bind(&submission.code)
        .bind(submission.language.as_str())
        .bind(submission.status.as_str())
        .bind(submission.score)
        .bind(submission.test_results.to_string())
        .bind(submission.submitted_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create submission")?;
        let id = result.last_insert_rowid();

        refresh_counters(&mut tx, submission.challenge_id).await?;
        let created = get(&mut tx, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Submission not found after insert"))?;
        tx.commit().await.context("Failed to commit submission")?;

        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Submission>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        get(&mut conn, id).await
    }

    async fn list(
        &self,
        viewer: &User,
        filter: &SubmissionFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Submission>, i64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM submissions s");
        push_scope(&mut count, viewer, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count submissions")?
            .get("count");

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM submissions s", SUBMISSION_COLUMNS));
        push_scope(&mut query, viewer, filter);
        query
            .push(" ORDER BY s.submitted_at DESC, s.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list submissions")?;

        let submissions = rows.iter().map(row_to_submission).collect::<Result<Vec<_>>>()?;
        Ok((submissions, total))
    }

    async fn for_user_challenge(
        &self,
        user_id: i64,
        challenge_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Submission>, i64)> {
        let count_row = sqlx::query(
            "SELECT COUNT(*) AS count FROM submissions WHERE user_id = ? AND challenge_id = ?",
        )
        .bind(user_id)
        .bind(challenge_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count user submissions")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM submissions s
            WHERE s.user_id = ? AND s.challenge_id = ?
            ORDER BY s.submitted_at DESC, s.id DESC
            LIMIT ? OFFSET ?
            "#,
            SUBMISSION_COLUMNS
        ))
        .bind(user_id)
        .bind(challenge_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list user submissions")?;

        let submissions = rows.iter().map(row_to_submission).collect::<Result<Vec<_>>>()?;
        Ok((submissions, total))
    }

    async fn recent_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Submission>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM submissions s WHERE s.user_id = ? ORDER BY s.submitted_at DESC, s.id DESC LIMIT ?",
            SUBMISSION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recent submissions")?;

        rows.iter().map(row_to_submission).collect()
    }

    async fn has_submitted(&self, user_id: i64, challenge_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM submissions WHERE user_id = ? AND challenge_id = ?",
        )
        .bind(user_id)
        .bind(challenge_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check submissions")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let Some(submission) = get(&mut tx, id).await? else {
            return Ok(());
        };
        sqlx::query("DELETE FROM submissions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete submission")?;
        refresh_counters(&mut tx, submission.challenge_id).await?;

        tx.commit().await.context("Failed to commit submission delete")?;
        Ok(())
    }

    async fn reset_pending(&self, id: i64) -> Result<Submission> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            UPDATE submissions
            SET status = 'pending', evaluated_at = NULL, submitted_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to reset submission")?;

        let submission = get(&mut tx, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Submission not found after reset"))?;
        refresh_counters(&mut tx, submission.challenge_id).await?;

        tx.commit().await.context("Failed to commit submission reset")?;
        Ok(submission)
    }
}

// ============================================================================
// Connection-level helpers
// ============================================================================

/// Load a submission on an existing connection
pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Submission>> {
    let row = sqlx::query(&format!("SELECT {} FROM submissions s WHERE s.id = ?", SUBMISSION_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to get submission")?;

    row.as_ref().map(row_to_submission).transpose()
}

/// Record an evaluation outcome with the computed rewards
pub async fn apply_evaluation(
    conn: &mut SqliteConnection,
    id: i64,
    evaluation: &EvaluationInput,
    points_earned: i64,
    xp_earned: i64,
) -> Result<Submission> {
    let test_results = evaluation
        .test_results
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));

    sqlx::query(
        r#"
        UPDATE submissions
        SET status = ?, score = ?, execution_time = ?, memory_used = ?, test_results = ?,
            passed_test_cases = ?, total_test_cases = ?, error_message = ?,
            compilation_output = ?, points_earned = ?, xp_earned = ?, evaluated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(evaluation.status.as_str())
    .bind(evaluation.score)
    .bind(evaluation.execution_time)
    .bind(evaluation.memory_used)
    .bind(test_results.to_string())
    .bind(evaluation.passed_test_cases)
    .bind(evaluation.total_test_cases)
    .bind(&evaluation.error_message)
    .bind(&evaluation.compilation_output)
    .bind(points_earned)
    .bind(xp_earned)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await
    .context("Failed to record evaluation")?;

    get(conn, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Submission not found after evaluation"))
}

/// Whether the user already had an accepted submission for the challenge
/// other than `exclude_id`
pub async fn has_other_accepted(
    conn: &mut SqliteConnection,
    user_id: i64,
    challenge_id: i64,
    exclude_id: i64,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count FROM submissions
        WHERE user_id = ? AND challenge_id = ? AND status = 'accepted' AND id != ?
        "#,
    )
    .bind(user_id)
    .bind(challenge_id)
    .bind(exclude_id)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to check accepted submissions")?;
    let count: i64 = row.get("count");
    Ok(count > 0)
}

fn row_to_submission(row: &SqliteRow) -> Result<Submission> {
    Ok(Submission {
        id: row.get("id"),
        user_id: row.get("user_id"),
        challenge_id: row.get("challenge_id"),
        code: row.get("code"),
        language: parse_enum(row, "language")?,
        status: parse_enum(row, "status")?,
        score: row.get("score"),
        execution_time: row.get("execution_time"),
        memory_used: row.get("memory_used"),
        test_results: parse_json(row, "test_results"),
        passed_test_cases: row.get("passed_test_cases"),
        total_test_cases: row.get("total_test_cases"),
        error_message: row.get("error_message"),
        compilation_output: row.get("compilation_output"),
        points_earned: row.get("points_earned"),
        xp_earned: row.get("xp_earned"),
        submitted_at: row.get("submitted_at"),
        evaluated_at: row.get("evaluated_at"),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::challenge::tests::new_challenge;
    use crate::db::repositories::test_support;
    use crate::db::repositories::{ChallengeRepository, SqlxChallengeRepository};
    use crate::models::{Language, SubmissionStatus};

    pub(crate) fn new_submission(user_id: i64, challenge_id: i64) -> Submission {
        Submission {
            id: 0,
            user_id,
            challenge_id,
            code: "print(3)".to_string(),
            language: Language::Python,
            status: SubmissionStatus::Pending,
            score: 0,
            execution_time: None,
            memory_used: None,
            test_results: serde_json::json!({}),
            passed_test_cases: 0,
            total_test_cases: 0,
            error_message: String::new(),
            compilation_output: String::new(),
            points_earned: 0,
            xp_earned: 0,
            submitted_at: Utc::now(),
            evaluated_at: None,
        }
    }

    fn accepted() -> EvaluationInput {
        EvaluationInput {
            status: SubmissionStatus::Accepted,
            score: 100,
            execution_time: Some(120),
            memory_used: Some(12),
            passed_test_cases: 3,
            total_test_cases: 3,
            test_results: None,
            error_message: String::new(),
            compilation_output: String::new(),
        }
    }

    #[tokio::test]
    async fn test_evaluation_and_reset() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let challenges = SqlxChallengeRepository::new(pool.clone());
        let challenge = challenges.create(&new_challenge("Sum It", author.id), &[]).await.unwrap();

        let repo = SqlxSubmissionRepository::new(pool.clone());
        let submission = repo.create(&new_submission(student.id, challenge.id)).await.unwrap();
        assert_eq!(submission.status, SubmissionStatus::Pending);
        assert_eq!(
            challenges.get_by_id(challenge.id).await.unwrap().unwrap().submission_count,
            1
        );

        let mut tx = pool.begin().await.unwrap();
        let evaluated = apply_evaluation(&mut tx, submission.id, &accepted(), 120, 60).await.unwrap();
        assert!(!has_other_accepted(&mut tx, student.id, challenge.id, submission.id).await.unwrap());
        refresh_counters(&mut tx, challenge.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(evaluated.points_earned, 120);
        assert!(evaluated.evaluated_at.is_some());
        assert_eq!(challenges.get_by_id(challenge.id).await.unwrap().unwrap().solved_count, 1);

        let reset = repo.reset_pending(submission.id).await.unwrap();
        assert_eq!(reset.status, SubmissionStatus::Pending);
        assert!(reset.evaluated_at.is_none());
        assert_eq!(challenges.get_by_id(challenge.id).await.unwrap().unwrap().solved_count, 0);
    }

    #[tokio::test]
    async fn test_list_is_role_scoped() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let other_teacher = test_support::user(&pool, "o@example.com", UserRole::Teacher).await;
        let admin = test_support::user(&pool, "a@example.com", UserRole::Admin).await;
        let alice = test_support::user(&pool, "alice@example.com", UserRole::Student).await;
        let bob = test_support::user(&pool, "bob@example.com", UserRole::Student).await;
        let challenge = SqlxChallengeRepository::new(pool.clone())
            .create(&new_challenge("Sum It", author.id), &[])
            .await
            .unwrap();

        let repo = SqlxSubmissionRepository::new(pool);
        repo.create(&new_submission(alice.id, challenge.id)).await.unwrap();
        repo.create(&new_submission(alice.id, challenge.id)).await.unwrap();
        repo.create(&new_submission(bob.id, challenge.id)).await.unwrap();

        let filter = SubmissionFilter::default();
        assert_eq!(repo.list(&admin, &filter, 0, 20).await.unwrap().1, 3);
        assert_eq!(repo.list(&author, &filter, 0, 20).await.unwrap().1, 3);
        assert_eq!(repo.list(&other_teacher, &filter, 0, 20).await.unwrap().1, 0);
        assert_eq!(repo.list(&alice, &filter, 0, 20).await.unwrap().1, 2);

        let (mine, total) = repo.for_user_challenge(bob.id, challenge.id, 0, 20).await.unwrap();
        assert_eq!((mine.len(), total), (1, 1));
        assert!(repo.has_submitted(alice.id, challenge.id).await.unwrap());
        assert_eq!(repo.recent_for_user(alice.id, 10).await.unwrap().len(), 2);
    }
}
