//! Challenge service
//!
//! Coding challenges with their learner-facing extras: submitting code,
//! favorites, ratings, the per-challenge leaderboard, progress and
//! recommendations. Submissions are stored as pending; evaluation lives in
//! the submission service.

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::{CategoryRepository, ChallengeRepository, SubmissionRepository, TagRepository};
use crate::models::{
    percentage, Challenge, ChallengeDifficulty, ChallengeFavorite, ChallengeFilter, ChallengeInput,
    ChallengeLeaderEntry, ChallengeRating, ChallengeRatingInput, ChallengeStatus, ListParams, PagedResult,
    Submission, UpdateChallengeInput, User,
};
use crate::services::rating::check_rating;
use crate::services::slug::unique_slug;
use crate::services::submission::{new_pending, SubmitInput};
use crate::services::tag::ensure_tags_exist;
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const FEATURED_LIMIT: i64 = 10;
const LEADERBOARD_LIMIT: i64 = 100;
const LEADERBOARD_TTL: Duration = Duration::from_secs(300);
const RECOMMENDATION_LIMIT: i64 = 10;
const RECENT_SUBMISSIONS: i64 = 10;

service_error!(
    /// Error types for challenge operations
    ChallengeServiceError
);

#[derive(Debug, Clone, Serialize)]
pub struct FavoriteToggle {
    pub is_favorited: bool,
}

/// A user's submissions to one challenge
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeSubmissions {
    pub submissions: Vec<Submission>,
    pub total_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyProgress {
    pub total: i64,
    pub solved: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeProgress {
    pub total_challenges: i64,
    pub solved_challenges: i64,
    pub attempted_challenges: i64,
    pub completion_percentage: f64,
    pub by_difficulty: BTreeMap<String, DifficultyProgress>,
    pub recent_submissions: Vec<Submission>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FavoriteInput {
    pub challenge_id: i64,
}

/// Check the JSON list fields of a challenge
pub fn check_challenge_data(examples: &Value, hints: &Value, test_cases: &Value, hidden: &Value) -> Result<(), String> {
    let has_keys = |item: &Value, keys: &[&str]| keys.iter().all(|k| item.get(*k).is_some());

    let examples = examples.as_array().ok_or("examples must be a list")?;
    if examples.iter().any(|e| !has_keys(e, &["input", "output"])) {
        return Err("Each example needs an input and an output".to_string());
    }

    let hints = hints.as_array().ok_or("hints must be a list")?;
    if hints.iter().any(|h| !h.is_string()) {
        return Err("Each hint must be a string".to_string());
    }

    let cases = test_cases.as_array().ok_or("test_cases must be a list")?;
    if cases.is_empty() {
        return Err("At least one test case is required".to_string());
    }
    if cases.iter().any(|c| !has_keys(c, &["input", "expected_output"])) {
        return Err("Each test case needs an input and an expected_output".to_string());
    }

    if !hidden.is_array() {
        return Err("hidden_test_cases must be a list".to_string());
    }
    Ok(())
}

/// Check the numeric settings of a challenge
pub fn check_rewards(
    difficulty: ChallengeDifficulty,
    points_reward: i64,
    xp_reward: i64,
    time_limit: i64,
    memory_limit: i64,
) -> Result<(), String> {
    let (low, high) = difficulty.points_band();
    if !(low..=high).contains(&points_reward) {
        return Err(format!(
            "points_reward for {} challenges must be between {} and {}",
            difficulty.as_str(),
            low,
            high
        ));
    }
    if !(1..=500).contains(&xp_reward) {
        return Err("xp_reward must be between 1 and 500".to_string());
    }
    if time_limit < 1 || memory_limit < 1 {
        return Err("time_limit and memory_limit must be positive".to_string());
    }
    Ok(())
}

/// The difficulties to recommend from, given solved counts per difficulty.
/// The most solved difficulty wins; ties go to the easier one.
pub fn recommended_difficulties(solved: &[(ChallengeDifficulty, i64)]) -> Vec<ChallengeDifficulty> {
    let best = solved
        .iter()
        .filter(|(_, count)| *count > 0)
        .fold(None::<(ChallengeDifficulty, i64)>, |best, &(d, c)| match best {
            Some((_, top)) if top >= c => best,
            _ => Some((d, c)),
        });

    match best {
        Some((difficulty, _)) => {
            let mut out = vec![difficulty];
            out.extend(difficulty.next());
            out
        }
        None => vec![ChallengeDifficulty::Beginner],
    }
}

pub struct ChallengeService {
    repo: Arc<dyn ChallengeRepository>,
    submission_repo: Arc<dyn SubmissionRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    tag_repo: Arc<dyn TagRepository>,
    cache: Arc<Cache>,
}

impl ChallengeService {
    pub fn new(
        repo: Arc<dyn ChallengeRepository>,
        submission_repo: Arc<dyn SubmissionRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        tag_repo: Arc<dyn TagRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            submission_repo,
            category_repo,
            tag_repo,
            cache,
        }
    }

    pub async fn list(
        &self,
        viewer: Option<&User>,
        mut filter: ChallengeFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Challenge>, ChallengeServiceError> {
        filter.published_only = !super::sees_drafts(viewer);
        let (items, total) = self
            .repo
            .list(&filter, params.offset(), params.limit())
            .await
            .context("Failed to list challenges")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, viewer: Option<&User>, id: i64) -> Result<Challenge, ChallengeServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get challenge")?
            .filter(|c| c.is_published() || super::sees_drafts(viewer))
            .ok_or_else(|| ChallengeServiceError::not_found("Challenge", id))
    }

    pub async fn featured(&self) -> Result<Vec<Challenge>, ChallengeServiceError> {
        Ok(self
            .repo
            .featured(FEATURED_LIMIT)
            .await
            .context("Failed to load featured challenges")?)
    }

    pub async fn create(&self, author: &User, input: ChallengeInput) -> Result<Challenge, ChallengeServiceError> {
        super::require_staff(author).map_err(ChallengeServiceError::Forbidden)?;

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(ChallengeServiceError::validation("Title is required"));
        }
        check_challenge_data(&input.examples, &input.hints, &input.test_cases, &input.hidden_test_cases)
            .map_err(ChallengeServiceError::ValidationError)?;
        check_rewards(
            input.difficulty_level,
            input.points_reward,
            input.xp_reward,
            input.time_limit,
            input.memory_limit,
        )
        .map_err(ChallengeServiceError::ValidationError)?;
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }
        ensure_tags_exist(self.tag_repo.as_ref(), &input.tag_ids)
            .await
            .map_err(ChallengeServiceError::ValidationError)?;

        let repo = &self.repo;
        let slug = unique_slug(&title, "challenge", |s| async move { repo.slug_exists(&s, 0).await })
            .await
            .context("Failed to generate slug")?;

        let now = Utc::now();
        let challenge = Challenge {
            id: 0,
            title,
            slug,
            description: input.description,
            problem_statement: input.problem_statement,
            difficulty_level: input.difficulty_level,
            challenge_type: input.challenge_type,
            category_id: input.category_id,
            tags: Vec::new(),
            input_format: input.input_format,
            output_format: input.output_format,
            constraints: input.constraints,
            examples: input.examples,
            hints: input.hints,
            test_cases: input.test_cases,
            hidden_test_cases: input.hidden_test_cases,
            solution_code: input.solution_code,
            solution_explanation: input.solution_explanation,
            time_limit: input.time_limit,
            memory_limit: input.memory_limit,
            points_reward: input.points_reward,
            xp_reward: input.xp_reward,
            status: input.status,
            is_featured: input.is_featured,
            author_id: author.id,
            submission_count: 0,
            solved_count: 0,
            average_rating: 0.0,
            published_at: (input.status == ChallengeStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
        };

        let created = self
            .repo
            .create(&challenge, &input.tag_ids)
            .await
            .context("Failed to create challenge")?;
        tracing::info!("Challenge {} created by user {}", created.id, author.id);
        Ok(created)
    }

    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: UpdateChallengeInput,
    ) -> Result<Challenge, ChallengeServiceError> {
        let mut challenge = self.authored(user, id).await?;

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(ChallengeServiceError::validation("Title is required"));
            }
            if title != challenge.title {
                let repo = &self.repo;
                challenge.slug = unique_slug(&title, "challenge", |s| async move { repo.slug_exists(&s, id).await })
                    .await
                    .context("Failed to generate slug")?;
                challenge.title = title;
            }
        }
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
            challenge.category_id = Some(category_id);
        }
        if let Some(tag_ids) = &input.tag_ids {
            ensure_tags_exist(self.tag_repo.as_ref(), tag_ids)
                .await
                .map_err(ChallengeServiceError::ValidationError)?;
        }

        if let Some(v) = input.description {
            challenge.description = v;
        }
        if let Some(v) = input.problem_statement {
            challenge.problem_statement = v;
        }
        if let Some(v) = input.difficulty_level {
            challenge.difficulty_level = v;
        }
        if let Some(v) = input.challenge_type {
            challenge.challenge_type = v;
        }
        if let Some(v) = input.input_format {
            challenge.input_format = v;
        }
        if let Some(v) = input.output_format {
            challenge.output_format = v;
        }
        if let Some(v) = input.constraints {
            challenge.constraints = v;
        }
        if let Some(v) = input.examples {
            challenge.examples = v;
        }
        if let Some(v) = input.hints {
            challenge.hints = v;
        }
        if let Some(v) = input.test_cases {
            challenge.test_cases = v;
        }
        if let Some(v) = input.hidden_test_cases {
            challenge.hidden_test_cases = v;
        }
        if let Some(v) = input.solution_code {
            challenge.solution_code = v;
        }
        if let Some(v) = input.solution_explanation {
            challenge.solution_explanation = v;
        }
        if let Some(v) = input.time_limit {
            challenge.time_limit = v;
        }
        if let Some(v) = input.memory_limit {
            challenge.memory_limit = v;
        }
        if let Some(v) = input.points_reward {
            challenge.points_reward = v;
        }
        if let Some(v) = input.xp_reward {
            challenge.xp_reward = v;
        }
        if let Some(v) = input.is_featured {
            challenge.is_featured = v;
        }
        if let Some(status) = input.status {
            challenge.published_at = match status {
                ChallengeStatus::Published => challenge.published_at.or_else(|| Some(Utc::now())),
                _ => None,
            };
            challenge.status = status;
        }

        check_challenge_data(
            &challenge.examples,
            &challenge.hints,
            &challenge.test_cases,
            &challenge.hidden_test_cases,
        )
        .map_err(ChallengeServiceError::ValidationError)?;
        check_rewards(
            challenge.difficulty_level,
            challenge.points_reward,
            challenge.xp_reward,
            challenge.time_limit,
            challenge.memory_limit,
        )
        .map_err(ChallengeServiceError::ValidationError)?;

        Ok(self
            .repo
            .update(&challenge, input.tag_ids.as_deref())
            .await
            .context("Failed to update challenge")?)
    }

    pub async fn delete(&self, user: &User, id: i64) -> Result<(), ChallengeServiceError> {
        self.authored(user, id).await?;
        self.repo.delete(id).await.context("Failed to delete challenge")?;
        if let Err(e) = self.cache.delete(&keys::challenge_leaderboard(id)).await {
            tracing::warn!("Failed to evict cache: {:#}", e);
        }
        tracing::info!("Challenge {} deleted by user {}", id, user.id);
        Ok(())
    }

    // ========================================================================
    // Learner actions
    // ========================================================================

    /// Store a pending submission for a published challenge
    pub async fn submit(&self, user: &User, id: i64, input: SubmitInput) -> Result<Submission, ChallengeServiceError> {
        let challenge = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get challenge")?
            .filter(Challenge::is_published)
            .ok_or_else(|| ChallengeServiceError::not_found("Challenge", id))?;

        let submission = new_pending(user.id, challenge.id, input).map_err(ChallengeServiceError::ValidationError)?;
        Ok(self
            .submission_repo
            .create(&submission)
            .await
            .context("Failed to store submission")?)
    }

    pub async fn submissions(
        &self,
        user: &User,
        id: i64,
        params: &ListParams,
    ) -> Result<ChallengeSubmissions, ChallengeServiceError> {
        self.get(Some(user), id).await?;
        let (submissions, total_count) = self
            .submission_repo
            .for_user_challenge(user.id, id, params.offset(), params.limit())
            .await
            .context("Failed to list submissions")?;
        Ok(ChallengeSubmissions {
            submissions,
            total_count,
        })
    }

    pub async fn toggle_favorite(&self, user: &User, id: i64) -> Result<FavoriteToggle, ChallengeServiceError> {
        self.get(Some(user), id).await?;
        match self
            .repo
            .find_favorite(user.id, id)
            .await
            .context("Failed to look up favorite")?
        {
            Some(favorite) => {
                self.repo
                    .delete_favorite(favorite.id)
                    .await
                    .context("Failed to remove favorite")?;
                Ok(FavoriteToggle { is_favorited: false })
            }
            None => {
                self.repo
                    .add_favorite(user.id, id)
                    .await
                    .context("Failed to add favorite")?;
                Ok(FavoriteToggle { is_favorited: true })
            }
        }
    }

    /// Rate a challenge the user has submitted to
    pub async fn rate(
        &self,
        user: &User,
        id: i64,
        input: ChallengeRatingInput,
    ) -> Result<ChallengeRating, ChallengeServiceError> {
        self.get(Some(user), id).await?;
        check_rating_input(&input)?;
        if !self
            .submission_repo
            .has_submitted(user.id, id)
            .await
            .context("Failed to check submissions")?
        {
            return Err(ChallengeServiceError::validation(
                "You must submit a solution before rating this challenge",
            ));
        }

        Ok(self
            .repo
            .upsert_rating(user.id, id, &input)
            .await
            .context("Failed to save rating")?)
    }

    /// Best accepted runs for one challenge, cached briefly
    pub async fn leaderboard(&self, id: i64) -> Result<Vec<ChallengeLeaderEntry>, ChallengeServiceError> {
        let key = keys::challenge_leaderboard(id);
        if let Some(board) = self
            .cache
            .get::<Vec<ChallengeLeaderEntry>>(&key)
            .await
            .ok()
            .flatten()
        {
            return Ok(board);
        }

        self.get(None, id).await?;
        let board = self
            .repo
            .leaderboard(id, LEADERBOARD_LIMIT)
            .await
            .context("Failed to build challenge leaderboard")?;
        if let Err(e) = self.cache.set(&key, &board, LEADERBOARD_TTL).await {
            tracing::warn!("Failed to write cache: {:#}", e);
        }
        Ok(board)
    }

    pub async fn my_progress(&self, user: &User) -> Result<ChallengeProgress, ChallengeServiceError> {
        let total = self.repo.count_published().await.context("Failed to count challenges")?;
        let solved = self
            .repo
            .count_solved(user.id)
            .await
            .context("Failed to count solved challenges")?;
        let attempted = self
            .repo
            .count_attempted(user.id)
            .await
            .context("Failed to count attempted challenges")?;

        let by_difficulty = self
            .repo
            .difficulty_progress(user.id)
            .await
            .context("Failed to load difficulty progress")?
            .into_iter()
            .map(|c| {
                (
                    c.difficulty.as_str().to_string(),
                    DifficultyProgress {
                        total: c.total,
                        solved: c.solved,
                        percentage: percentage(c.solved, c.total),
                    },
                )
            })
            .collect();

        let recent_submissions = self
            .submission_repo
            .recent_for_user(user.id, RECENT_SUBMISSIONS)
            .await
            .context("Failed to load recent submissions")?;

        Ok(ChallengeProgress {
            total_challenges: total,
            solved_challenges: solved,
            attempted_challenges: attempted,
            completion_percentage: percentage(solved, total),
            by_difficulty,
            recent_submissions,
        })
    }

    /// Newcomers get untouched beginner challenges; everyone else gets
    /// unsolved challenges at their usual difficulty and the next one up.
    pub async fn recommendations(&self, user: &User) -> Result<Vec<Challenge>, ChallengeServiceError> {
        let progress = self
            .repo
            .difficulty_progress(user.id)
            .await
            .context("Failed to load difficulty progress")?;
        let solved: Vec<(ChallengeDifficulty, i64)> = progress.iter().map(|c| (c.difficulty, c.solved)).collect();
        let newcomer = solved.iter().all(|(_, count)| *count == 0);

        Ok(self
            .repo
            .unsolved_by_difficulty(
                user.id,
                &recommended_difficulties(&solved),
                newcomer,
                RECOMMENDATION_LIMIT,
            )
            .await
            .context("Failed to load recommendations")?)
    }

    // ========================================================================
    // Ratings and favorites
    // ========================================================================

    /// Own ratings plus every reviewed one; admins see all
    pub async fn list_ratings(
        &self,
        viewer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<ChallengeRating>, ChallengeServiceError> {
        let scope = (!viewer.is_admin()).then_some(viewer.id);
        let (items, total) = self
            .repo
            .list_ratings(scope, params.offset(), params.limit())
            .await
            .context("Failed to list ratings")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_rating(&self, viewer: &User, id: i64) -> Result<ChallengeRating, ChallengeServiceError> {
        self.repo
            .get_rating(id)
            .await
            .context("Failed to get rating")?
            .filter(|r| viewer.can_modify(r.user_id))
            .ok_or_else(|| ChallengeServiceError::not_found("Rating", id))
    }

    pub async fn update_rating(
        &self,
        viewer: &User,
        id: i64,
        input: ChallengeRatingInput,
    ) -> Result<ChallengeRating, ChallengeServiceError> {
        self.get_rating(viewer, id).await?;
        check_rating_input(&input)?;
        Ok(self
            .repo
            .update_rating(id, &input)
            .await
            .context("Failed to update rating")?)
    }

    pub async fn delete_rating(&self, viewer: &User, id: i64) -> Result<(), ChallengeServiceError> {
        self.get_rating(viewer, id).await?;
        self.repo.delete_rating(id).await.context("Failed to delete rating")?;
        Ok(())
    }

    pub async fn list_favorites(
        &self,
        user: &User,
        params: &ListParams,
    ) -> Result<PagedResult<ChallengeFavorite>, ChallengeServiceError> {
        let (items, total) = self
            .repo
            .list_favorites(user.id, params.offset(), params.limit())
            .await
            .context("Failed to list favorites")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn add_favorite(&self, user: &User, input: FavoriteInput) -> Result<ChallengeFavorite, ChallengeServiceError> {
        self.get(Some(user), input.challenge_id).await?;
        if self
            .repo
            .find_favorite(user.id, input.challenge_id)
            .await
            .context("Failed to look up favorite")?
            .is_some()
        {
            return Err(ChallengeServiceError::Conflict(
                "Challenge is already a favorite".to_string(),
            ));
        }
        Ok(self
            .repo
            .add_favorite(user.id, input.challenge_id)
            .await
            .context("Failed to add favorite")?)
    }

    pub async fn delete_favorite(&self, user: &User, id: i64) -> Result<(), ChallengeServiceError> {
        self.repo
            .get_favorite(id)
            .await
            .context("Failed to get favorite")?
            .filter(|f| f.user_id == user.id)
            .ok_or_else(|| ChallengeServiceError::not_found("Favorite", id))?;
        self.repo.delete_favorite(id).await.context("Failed to delete favorite")?;
        Ok(())
    }

    async fn authored(&self, user: &User, id: i64) -> Result<Challenge, ChallengeServiceError> {
        super::require_staff(user).map_err(ChallengeServiceError::Forbidden)?;
        let challenge = self.get(Some(user), id).await?;
        if !user.can_modify(challenge.author_id) {
            return Err(ChallengeServiceError::forbidden(
                "Only the author or an admin can change this challenge",
            ));
        }
        Ok(challenge)
    }

    async fn ensure_category(&self, id: i64) -> Result<(), ChallengeServiceError> {
        self.category_repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| ChallengeServiceError::validation(format!("Category {} does not exist", id)))?;
        Ok(())
    }
}

fn check_rating_input(input: &ChallengeRatingInput) -> Result<(), ChallengeServiceError> {
    for value in [input.rating, input.difficulty_rating, input.clarity_rating] {
        check_rating(value).map_err(ChallengeServiceError::ValidationError)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::challenge::tests::new_challenge;
    use crate::db::repositories::{
        test_support, SqlxCategoryRepository, SqlxChallengeRepository, SqlxSubmissionRepository, SqlxTagRepository,
    };
    use crate::models::{Language, UserRole};
    use serde_json::json;
    use sqlx::SqlitePool;

    fn service(pool: &SqlitePool) -> ChallengeService {
        ChallengeService::new(
            SqlxChallengeRepository::boxed(pool.clone()),
            SqlxSubmissionRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
            create_cache(&CacheConfig::default()),
        )
    }

    fn input(title: &str) -> ChallengeInput {
        ChallengeInput {
            title: title.to_string(),
            description: String::new(),
            problem_statement: "Add two numbers".to_string(),
            difficulty_level: ChallengeDifficulty::Beginner,
            challenge_type: Default::default(),
            category_id: None,
            tag_ids: Vec::new(),
            input_format: String::new(),
            output_format: String::new(),
            constraints: String::new(),
            examples: json!([{"input": "1 2", "output": "3"}]),
            hints: json!(["Use addition"]),
            test_cases: json!([{"input": "1 2", "expected_output": "3"}]),
            hidden_test_cases: json!([]),
            solution_code: String::new(),
            solution_explanation: String::new(),
            time_limit: 1000,
            memory_limit: 256,
            points_reward: 100,
            xp_reward: 50,
            status: ChallengeStatus::Draft,
            is_featured: false,
        }
    }

    fn code(text: &str) -> SubmitInput {
        SubmitInput {
            code: text.to_string(),
            language: Language::Python,
        }
    }

    #[test]
    fn test_check_challenge_data() {
        let ok = check_challenge_data(
            &json!([{"input": "1", "output": "1"}]),
            &json!([]),
            &json!([{"input": "1", "expected_output": "1"}]),
            &json!([]),
        );
        assert!(ok.is_ok());

        assert!(check_challenge_data(&json!([]), &json!([]), &json!([]), &json!([])).is_err());
        assert!(check_challenge_data(
            &json!([{"input": "1"}]),
            &json!([]),
            &json!([{"input": "1", "expected_output": "1"}]),
            &json!([])
        )
        .is_err());
        assert!(check_challenge_data(&json!([]), &json!([]), &json!([{"input": "1"}]), &json!([])).is_err());
    }

    #[test]
    fn test_check_rewards_uses_band() {
        assert!(check_rewards(ChallengeDifficulty::Beginner, 200, 50, 1000, 256).is_ok());
        assert!(check_rewards(ChallengeDifficulty::Beginner, 201, 50, 1000, 256).is_err());
        assert!(check_rewards(ChallengeDifficulty::Expert, 250, 50, 1000, 256).is_err());
        assert!(check_rewards(ChallengeDifficulty::Expert, 1000, 501, 1000, 256).is_err());
    }

    #[test]
    fn test_recommended_difficulties() {
        use ChallengeDifficulty::*;
        assert_eq!(recommended_difficulties(&[]), vec![Beginner]);
        assert_eq!(
            recommended_difficulties(&[(Beginner, 1), (Intermediate, 3), (Advanced, 0)]),
            vec![Intermediate, Advanced]
        );
        assert_eq!(recommended_difficulties(&[(Beginner, 2), (Intermediate, 2)]), vec![Beginner, Intermediate]);
        assert_eq!(recommended_difficulties(&[(Expert, 1)]), vec![Expert]);
    }

    #[tokio::test]
    async fn test_status_drives_published_at() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let service = service(&pool);

        assert!(matches!(
            service.create(&student, input("Sum")).await,
            Err(ChallengeServiceError::Forbidden(_))
        ));
        let mut bad = input("Sum");
        bad.points_reward = 10;
        assert!(matches!(
            service.create(&teacher, bad).await,
            Err(ChallengeServiceError::ValidationError(_))
        ));

        let draft = service.create(&teacher, input("Sum")).await.unwrap();
        assert!(draft.published_at.is_none());
        assert!(service.get(None, draft.id).await.is_err());

        let publish = UpdateChallengeInput {
            status: Some(ChallengeStatus::Published),
            ..Default::default()
        };
        let published = service.update(&teacher, draft.id, publish).await.unwrap();
        assert!(published.published_at.is_some());
        assert!(service.get(None, draft.id).await.is_ok());

        let archive = UpdateChallengeInput {
            status: Some(ChallengeStatus::Archived),
            ..Default::default()
        };
        let archived = service.update(&teacher, draft.id, archive).await.unwrap();
        assert!(archived.published_at.is_none());
    }

    #[tokio::test]
    async fn test_submit_favorite_and_rate() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let repo = SqlxChallengeRepository::boxed(pool.clone());
        let challenge = repo.create(&new_challenge("Sum It", teacher.id), &[]).await.unwrap();
        let service = service(&pool);

        let rating = ChallengeRatingInput {
            rating: 4,
            difficulty_rating: 2,
            clarity_rating: 5,
            review: "Nice".to_string(),
        };
        assert!(service.rate(&student, challenge.id, rating.clone()).await.is_err());

        assert!(service.submit(&student, challenge.id, code("   ")).await.is_err());
        assert!(service
            .submit(&student, challenge.id, code(&"x".repeat(50_001)))
            .await
            .is_err());
        let submission = service.submit(&student, challenge.id, code("print(3)")).await.unwrap();
        assert_eq!(submission.status, crate::models::SubmissionStatus::Pending);

        let mine = service
            .submissions(&student, challenge.id, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(mine.total_count, 1);

        let saved = service.rate(&student, challenge.id, rating).await.unwrap();
        assert_eq!(saved.rating, 4);
        let reloaded = service.get(None, challenge.id).await.unwrap();
        assert_eq!(reloaded.average_rating, 4.0);
        assert_eq!(reloaded.submission_count, 1);

        assert!(service.toggle_favorite(&student, challenge.id).await.unwrap().is_favorited);
        assert_eq!(service.list_favorites(&student, &ListParams::default()).await.unwrap().total, 1);
        assert!(!service.toggle_favorite(&student, challenge.id).await.unwrap().is_favorited);
    }

    #[tokio::test]
    async fn test_progress_and_recommendations_for_newcomer() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let repo = SqlxChallengeRepository::boxed(pool.clone());
        let first = repo.create(&new_challenge("Sum It", teacher.id), &[]).await.unwrap();
        repo.create(&new_challenge("Count Trees", teacher.id), &[]).await.unwrap();
        let service = service(&pool);

        service.submit(&student, first.id, code("print(3)")).await.unwrap();

        let progress = service.my_progress(&student).await.unwrap();
        assert_eq!(progress.total_challenges, 2);
        assert_eq!(progress.solved_challenges, 0);
        assert_eq!(progress.attempted_challenges, 1);
        assert_eq!(progress.completion_percentage, 0.0);
        assert_eq!(progress.recent_submissions.len(), 1);
        assert_eq!(progress.by_difficulty["beginner"].total, 2);

        // the attempted challenge is left out for newcomers
        let recommended = service.recommendations(&student).await.unwrap();
        assert_eq!(recommended.len(), 1);
        assert_eq!(recommended[0].title, "Count Trees");
    }
}
