//! Submission service
//!
//! Code is never run here. Submissions wait as `pending` until an admin
//! records the outcome with `evaluate`, which prices the submission, recounts
//! the challenge and, on a first accepted solution, runs the challenge
//! award cascade in the same transaction.

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::challenge::refresh_counters;
use crate::db::repositories::submission::{apply_evaluation, get, has_other_accepted};
use crate::db::repositories::{ChallengeRepository, SubmissionRepository};
use crate::models::{
    compute_reward, Challenge, EvaluationInput, Language, ListParams, PagedResult, Submission, SubmissionFilter,
    SubmissionStatus, User,
};
use crate::services::gamification::{self, invalidate_rankings};
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Largest accepted source size in bytes
pub const MAX_CODE_BYTES: usize = 50_000;

service_error!(
    /// Error types for submission operations
    SubmissionServiceError
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitInput {
    pub code: String,
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionInput {
    pub challenge_id: i64,
    pub code: String,
    #[serde(default)]
    pub language: Language,
}

/// Build a pending submission after checking the code
pub(crate) fn new_pending(user_id: i64, challenge_id: i64, input: SubmitInput) -> Result<Submission, String> {
    if input.code.trim().is_empty() {
        return Err("Code cannot be empty".to_string());
    }
    if input.code.len() > MAX_CODE_BYTES {
        return Err(format!("Code cannot exceed {} bytes", MAX_CODE_BYTES));
    }

    Ok(Submission {
        id: 0,
        user_id,
        challenge_id,
        code: input.code,
        language: input.language,
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
    })
}

fn check_evaluation(input: &EvaluationInput) -> Result<(), String> {
    if input.status == SubmissionStatus::Pending {
        return Err("An evaluation cannot leave the submission pending".to_string());
    }
    if !(0..=100).contains(&input.score) {
        return Err("score must be between 0 and 100".to_string());
    }
    if input.passed_test_cases < 0 || input.total_test_cases < 0 {
        return Err("Test case counts cannot be negative".to_string());
    }
    if input.passed_test_cases > input.total_test_cases {
        return Err("passed_test_cases cannot exceed total_test_cases".to_string());
    }
    if input.execution_time.is_some_and(|t| t < 0) || input.memory_used.is_some_and(|m| m < 0) {
        return Err("Execution time and memory cannot be negative".to_string());
    }
    Ok(())
}

pub struct SubmissionService {
    pool: SqlitePool,
    repo: Arc<dyn SubmissionRepository>,
    challenge_repo: Arc<dyn ChallengeRepository>,
    cache: Arc<Cache>,
}

impl SubmissionService {
    pub fn new(
        pool: SqlitePool,
        repo: Arc<dyn SubmissionRepository>,
        challenge_repo: Arc<dyn ChallengeRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            pool,
            repo,
            challenge_repo,
            cache,
        }
    }

    pub async fn list(
        &self,
        viewer: &User,
        filter: &SubmissionFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Submission>, SubmissionServiceError> {
        let (items, total) = self
            .repo
            .list(viewer, filter, params.offset(), params.limit())
            .await
            .context("Failed to list submissions")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Owners, admins and the author of the challenge can see a submission
    pub async fn get(&self, viewer: &User, id: i64) -> Result<Submission, SubmissionServiceError> {
        let submission = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get submission")?
            .ok_or_else(|| SubmissionServiceError::not_found("Submission", id))?;

        if viewer.can_modify(submission.user_id) {
            return Ok(submission);
        }
        if viewer.is_staff() {
            let challenge = self.challenge(submission.challenge_id).await?;
            if challenge.author_id == viewer.id {
                return Ok(submission);
            }
        }
        Err(SubmissionServiceError::not_found("Submission", id))
    }

    pub async fn create(&self, user: &User, input: SubmissionInput) -> Result<Submission, SubmissionServiceError> {
        let challenge = self
            .challenge_repo
            .get_by_id(input.challenge_id)
            .await
            .context("Failed to get challenge")?
            .filter(Challenge::is_published)
            .ok_or_else(|| {
                SubmissionServiceError::validation(format!(
                    "Challenge {} does not exist or is not published",
                    input.challenge_id
                ))
            })?;

        let submission = new_pending(
            user.id,
            challenge.id,
            SubmitInput {
                code: input.code,
                language: input.language,
            },
        )
        .map_err(SubmissionServiceError::ValidationError)?;

        Ok(self
            .repo
            .create(&submission)
            .await
            .context("Failed to store submission")?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> Result<(), SubmissionServiceError> {
        let submission = self.get(user, id).await?;
        if !user.can_modify(submission.user_id) {
            return Err(SubmissionServiceError::forbidden(
                "Only the owner or an admin can delete a submission",
            ));
        }
        self.repo.delete(id).await.context("Failed to delete submission")?;
        self.invalidate(&submission).await;
        Ok(())
    }

    /// Put a submission back in the queue
    pub async fn resubmit(&self, user: &User, id: i64) -> Result<Submission, SubmissionServiceError> {
        let submission = self.get(user, id).await?;
        if !(submission.user_id == user.id || user.is_staff()) {
            return Err(SubmissionServiceError::forbidden(
                "Only the owner, a teacher or an admin can resubmit",
            ));
        }
        let reset = self
            .repo
            .reset_pending(id)
            .await
            .context("Failed to reset submission")?;
        self.invalidate(&reset).await;
        Ok(reset)
    }

    /// Record a judge outcome by hand
    pub async fn evaluate(
        &self,
        admin: &User,
        id: i64,
        input: EvaluationInput,
    ) -> Result<Submission, SubmissionServiceError> {
        super::require_admin(admin).map_err(SubmissionServiceError::Forbidden)?;
        check_evaluation(&input).map_err(SubmissionServiceError::ValidationError)?;

        let current = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get submission")?
            .ok_or_else(|| SubmissionServiceError::not_found("Submission", id))?;
        let challenge = self.challenge(current.challenge_id).await?;

        let reward = |base: i64| {
            compute_reward(
                base,
                input.status,
                input.execution_time,
                challenge.time_limit,
                input.passed_test_cases,
                input.total_test_cases,
            )
        };
        let points = reward(challenge.points_reward);
        let xp = reward(challenge.xp_reward);

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let was_accepted = get(&mut *tx, id)
            .await?
            .map(|s| s.status == SubmissionStatus::Accepted)
            .unwrap_or(false);
        let evaluated = apply_evaluation(&mut *tx, id, &input, points, xp).await?;
        refresh_counters(&mut *tx, challenge.id).await?;

        let mut outcome = gamification::CascadeOutcome::default();
        if evaluated.status == SubmissionStatus::Accepted
            && !was_accepted
            && !has_other_accepted(&mut *tx, evaluated.user_id, challenge.id, id).await?
        {
            outcome = gamification::challenge_solved(&mut *tx, &challenge, &evaluated).await?;
        }
        tx.commit().await.context("Failed to commit evaluation")?;

        self.invalidate(&evaluated).await;
        invalidate_rankings(&self.cache, &outcome).await;

        tracing::info!(
            "Submission {} evaluated as {} by admin {}",
            id,
            evaluated.status.as_str(),
            admin.id
        );
        Ok(evaluated)
    }

    async fn challenge(&self, id: i64) -> Result<Challenge, SubmissionServiceError> {
        self.challenge_repo
            .get_by_id(id)
            .await
            .context("Failed to get challenge")?
            .ok_or_else(|| SubmissionServiceError::not_found("Challenge", id))
    }

    async fn invalidate(&self, submission: &Submission) {
        let stale = [
            keys::GLOBAL_LEADERBOARD.to_string(),
            keys::challenge_leaderboard(submission.challenge_id),
            keys::user_leaderboard(submission.user_id),
        ];
        for key in &stale {
            if let Err(e) = self.cache.delete(key).await {
                tracing::warn!("Failed to evict cache key {}: {:#}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::challenge::tests::new_challenge;
    use crate::db::repositories::{
        test_support, GamificationRepository, SqlxChallengeRepository, SqlxGamificationRepository,
        SqlxSubmissionRepository, SqlxUserRepository, UserRepository,
    };
    use crate::models::{AchievementType, TransactionType, UserRole};

    struct Fixture {
        service: SubmissionService,
        challenge: Challenge,
        teacher: User,
        student: User,
        admin: User,
        pool: SqlitePool,
    }

    async fn fixture() -> Fixture {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let admin = test_support::user(&pool, "a@example.com", UserRole::Admin).await;
        let challenge_repo = SqlxChallengeRepository::boxed(pool.clone());
        let challenge = challenge_repo
            .create(&new_challenge("Sum It", teacher.id), &[])
            .await
            .unwrap();
        let service = SubmissionService::new(
            pool.clone(),
            SqlxSubmissionRepository::boxed(pool.clone()),
            challenge_repo,
            create_cache(&CacheConfig::default()),
        );
        Fixture {
            service,
            challenge,
            teacher,
            student,
            admin,
            pool,
        }
    }

    fn submission(challenge_id: i64) -> SubmissionInput {
        SubmissionInput {
            challenge_id,
            code: "print(sum(map(int, input().split())))".to_string(),
            language: Language::Python,
        }
    }

    fn accepted(execution_time: i64) -> EvaluationInput {
        EvaluationInput {
            status: SubmissionStatus::Accepted,
            score: 100,
            execution_time: Some(execution_time),
            memory_used: Some(10),
            passed_test_cases: 3,
            total_test_cases: 3,
            test_results: None,
            error_message: String::new(),
            compilation_output: String::new(),
        }
    }

    #[test]
    fn test_new_pending_checks_code() {
        let input = |code: &str| SubmitInput {
            code: code.to_string(),
            language: Language::Rust,
        };
        assert!(new_pending(1, 1, input("fn main() {}")).is_ok());
        assert!(new_pending(1, 1, input(" \n ")).is_err());
        assert!(new_pending(1, 1, input(&"a".repeat(MAX_CODE_BYTES))).is_ok());
        assert!(new_pending(1, 1, input(&"a".repeat(MAX_CODE_BYTES + 1))).is_err());
    }

    #[test]
    fn test_check_evaluation() {
        assert!(check_evaluation(&accepted(100)).is_ok());
        let mut bad = accepted(100);
        bad.passed_test_cases = 4;
        assert!(check_evaluation(&bad).is_err());
        bad = accepted(100);
        bad.status = SubmissionStatus::Pending;
        assert!(check_evaluation(&bad).is_err());
    }

    #[tokio::test]
    async fn test_visibility_is_role_scoped() {
        let f = fixture().await;
        let other = test_support::user(&f.pool, "o@example.com", UserRole::Student).await;
        let stranger = test_support::user(&f.pool, "t2@example.com", UserRole::Teacher).await;

        let created = f.service.create(&f.student, submission(f.challenge.id)).await.unwrap();

        assert!(f.service.get(&f.student, created.id).await.is_ok());
        assert!(f.service.get(&f.teacher, created.id).await.is_ok());
        assert!(f.service.get(&f.admin, created.id).await.is_ok());
        assert!(matches!(
            f.service.get(&other, created.id).await,
            Err(SubmissionServiceError::NotFound(_))
        ));
        assert!(f.service.get(&stranger, created.id).await.is_err());

        let filter = SubmissionFilter::default();
        let params = ListParams::default();
        assert_eq!(f.service.list(&f.student, &filter, &params).await.unwrap().total, 1);
        assert_eq!(f.service.list(&f.teacher, &filter, &params).await.unwrap().total, 1);
        assert_eq!(f.service.list(&other, &filter, &params).await.unwrap().total, 0);

        assert!(matches!(
            f.service.delete(&f.teacher, created.id).await,
            Err(SubmissionServiceError::Forbidden(_))
        ));
        f.service.delete(&f.student, created.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_evaluate_runs_cascade_once() {
        let f = fixture().await;
        let created = f.service.create(&f.student, submission(f.challenge.id)).await.unwrap();

        assert!(matches!(
            f.service.evaluate(&f.teacher, created.id, accepted(100)).await,
            Err(SubmissionServiceError::Forbidden(_))
        ));

        let evaluated = f.service.evaluate(&f.admin, created.id, accepted(100)).await.unwrap();
        assert_eq!(evaluated.status, SubmissionStatus::Accepted);
        assert!(evaluated.evaluated_at.is_some());
        // 100 points with the x1.2 speed bonus
        assert_eq!(evaluated.points_earned, 120);
        assert_eq!(evaluated.xp_earned, 60);

        let users = SqlxUserRepository::new(f.pool.clone());
        let profile = users.get_profile(f.student.id).await.unwrap().unwrap();
        // 120 solved + 50 Problem Solver + 20 Speed Demon, before milestones
        assert!(profile.total_points >= 190);
        assert_eq!(profile.experience_points, 60);
        let before = profile.total_points;

        // evaluating the same accepted submission again awards nothing new
        f.service.evaluate(&f.admin, created.id, accepted(100)).await.unwrap();
        let profile = users.get_profile(f.student.id).await.unwrap().unwrap();
        assert_eq!(profile.total_points, before);

        let gamification = SqlxGamificationRepository::new(f.pool.clone());
        let (achievements, _) = gamification
            .list_achievements(Some(f.student.id), 0, 100)
            .await
            .unwrap();
        let count = |kind: AchievementType| achievements.iter().filter(|a| a.achievement_type == kind).count();
        assert_eq!(count(AchievementType::FirstChallenge), 1);
        assert_eq!(count(AchievementType::SpeedDemon), 1);

        let challenge = SqlxChallengeRepository::new(f.pool.clone())
            .get_by_id(f.challenge.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(challenge.solved_count, 1);
    }

    #[tokio::test]
    async fn test_resubmit_resets_to_pending() {
        let f = fixture().await;
        let created = f.service.create(&f.student, submission(f.challenge.id)).await.unwrap();
        let mut wrong = accepted(900);
        wrong.status = SubmissionStatus::WrongAnswer;
        wrong.passed_test_cases = 1;

        let evaluated = f.service.evaluate(&f.admin, created.id, wrong).await.unwrap();
        // 30% of 100 for one of three tests
        assert_eq!(evaluated.points_earned, 10);

        let reset = f.service.resubmit(&f.student, created.id).await.unwrap();
        assert_eq!(reset.status, SubmissionStatus::Pending);
        assert!(reset.evaluated_at.is_none());
    }

    #[tokio::test]
    async fn test_resubmitted_solution_is_rewarded_once() {
        let f = fixture().await;
        let created = f.service.create(&f.student, submission(f.challenge.id)).await.unwrap();

        f.service.evaluate(&f.admin, created.id, accepted(900)).await.unwrap();
        let users = SqlxUserRepository::new(f.pool.clone());
        let first = users.get_profile(f.student.id).await.unwrap().unwrap();

        f.service.resubmit(&f.student, created.id).await.unwrap();
        let again = f.service.evaluate(&f.admin, created.id, accepted(900)).await.unwrap();
        assert_eq!(again.status, SubmissionStatus::Accepted);

        let gamification = SqlxGamificationRepository::new(f.pool.clone());
        let (solved, _) = gamification
            .list_transactions(Some(f.student.id), Some(TransactionType::ChallengeSolved), 0, 100)
            .await
            .unwrap();
        assert_eq!(solved.len(), 1);

        let second = users.get_profile(f.student.id).await.unwrap().unwrap();
        assert_eq!(second.total_points, first.total_points);
        assert_eq!(second.experience_points, first.experience_points);
    }

    #[tokio::test]
    async fn test_create_requires_published_challenge() {
        let f = fixture().await;
        let repo = SqlxChallengeRepository::new(f.pool.clone());
        let mut draft = new_challenge("Draft One", f.teacher.id);
        draft.status = crate::models::ChallengeStatus::Draft;
        let draft = repo.create(&draft, &[]).await.unwrap();

        assert!(matches!(
            f.service.create(&f.student, submission(draft.id)).await,
            Err(SubmissionServiceError::ValidationError(_))
        ));
    }
}
