//! Challenge repository
//!
//! Database operations for coding challenges, their ratings and favorites,
//! and the aggregate queries behind progress, recommendations and the
//! per-challenge leaderboard.
//!
//! `submission_count` and `solved_count` are recomputed from the submissions
//! table rather than incremented, so they cannot drift.

use crate::models::{
    round2, Challenge, ChallengeDifficulty, ChallengeFavorite, ChallengeFilter,
    ChallengeLeaderEntry, ChallengeRating, ChallengeRatingInput,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

use super::tag::{self, TagTarget};
use super::user::display_name;
use super::{like_pattern, parse_enum, parse_json};

/// Per-difficulty progress counts for one user
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyCounts {
    pub difficulty: ChallengeDifficulty,
    pub total: i64,
    pub solved: i64,
}

/// Challenge repository trait
#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    /// Create a challenge with its tags
    async fn create(&self, challenge: &Challenge, tag_ids: &[i64]) -> Result<Challenge>;

    /// Get challenge by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Challenge>>;

    /// Update a challenge; `tag_ids` replaces the tags when given
    async fn update(&self, challenge: &Challenge, tag_ids: Option<&[i64]>) -> Result<Challenge>;

    /// Delete a challenge
    async fn delete(&self, id: i64) -> Result<()>;

    /// List challenges matching the filter, newest first
    async fn list(&self, filter: &ChallengeFilter, offset: i64, limit: i64) -> Result<(Vec<Challenge>, i64)>;

    /// Published and featured challenges
    async fn featured(&self, limit: i64) -> Result<Vec<Challenge>>;

    /// Check if a slug is taken by a challenge other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool>;

    // Ratings

    async fn get_rating(&self, id: i64) -> Result<Option<ChallengeRating>>;

    /// List ratings; with `viewer_id`, only the viewer's own and those with a review
    async fn list_ratings(&self, viewer_id: Option<i64>, offset: i64, limit: i64)
        -> Result<(Vec<ChallengeRating>, i64)>;

    /// Insert or replace a user's rating and refresh the average
    async fn upsert_rating(&self, user_id: i64, challenge_id: i64, input: &ChallengeRatingInput)
        -> Result<ChallengeRating>;

    /// Change an existing rating and refresh the average
    async fn update_rating(&self, id: i64, input: &ChallengeRatingInput) -> Result<ChallengeRating>;

    /// Delete a rating and refresh the average
    async fn delete_rating(&self, id: i64) -> Result<()>;

    // Favorites

    async fn get_favorite(&self, id: i64) -> Result<Option<ChallengeFavorite>>;

    async fn find_favorite(&self, user_id: i64, challenge_id: i64) -> Result<Option<ChallengeFavorite>>;

    async fn add_favorite(&self, user_id: i64, challenge_id: i64) -> Result<ChallengeFavorite>;

    async fn delete_favorite(&self, id: i64) -> Result<()>;

    async fn list_favorites(&self, user_id: i64, offset: i64, limit: i64) -> Result<(Vec<ChallengeFavorite>, i64)>;

    // Aggregates

    async fn count_published(&self) -> Result<i64>;

    /// Distinct published challenges the user has an accepted submission for
    async fn count_solved(&self, user_id: i64) -> Result<i64>;

    /// Distinct challenges the user has submitted to
    async fn count_attempted(&self, user_id: i64) -> Result<i64>;

    /// Published totals and the user's solved counts per difficulty
    async fn difficulty_progress(&self, user_id: i64) -> Result<Vec<DifficultyCounts>>;

    /// Published challenges of the given difficulties the user has not solved.
    /// With `exclude_attempted`, challenges with any submission are skipped too.
    async fn unsolved_by_difficulty(
        &self,
        user_id: i64,
        difficulties: &[ChallengeDifficulty],
        exclude_attempted: bool,
        limit: i64,
    ) -> Result<Vec<Challenge>>;

    /// Best accepted runs per user, best score then fastest time
    async fn leaderboard(&self, challenge_id: i64, limit: i64) -> Result<Vec<ChallengeLeaderEntry>>;
}

/// SQLx-based challenge repository implementation
pub struct SqlxChallengeRepository {
    pool: SqlitePool,
}

impl SqlxChallengeRepository {
    /// Create a new SQLx challenge repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn ChallengeRepository> {
        Arc::new(Self::new(pool))
    }

    async fn with_tags(&self, mut challenges: Vec<Challenge>) -> Result<Vec<Challenge>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        for challenge in challenges.iter_mut() {
            challenge.tags = tag::get_for(&mut conn, TagTarget::Challenge, challenge.id).await?;
        }
        Ok(challenges)
    }

    async fn fetch_many(&self, rows: Vec<SqliteRow>) -> Result<Vec<Challenge>> {
        let challenges = rows.iter().map(row_to_challenge).collect::<Result<Vec<_>>>()?;
        self.with_tags(challenges).await
    }

    async fn refresh_average_rating(&self, challenge_id: i64) -> Result<()> {
        let row = sqlx::query("SELECT AVG(rating) AS average FROM challenge_ratings WHERE challenge_id = ?")
            .bind(challenge_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to average challenge ratings")?;
        let average: Option<f64> = row.get("average");

        sqlx::query("UPDATE challenges SET average_rating = ? WHERE id = ?")
            .bind(round2(average.unwrap_or(0.0)))
            .bind(challenge_id)
            .execute(&self.pool)
            .await
            .context("Failed to update average rating")?;
        Ok(())
    }
}

const CHALLENGE_COLUMNS: &str = "c.id, c.title, c.slug, c.description, c.problem_statement, \
     c.difficulty_level, c.challenge_type, c.category_id, c.input_format, c.output_format, \
     c.constraints, c.examples, c.hints, c.test_cases, c.hidden_test_cases, c.solution_code, \
     c.solution_explanation, c.time_limit, c.memory_limit, c.points_reward, c.xp_reward, \
     c.status, c.is_featured, c.author_id, c.submission_count, c.solved_count, \
     c.average_rating, c.published_at, c.created_at, c.updated_at";

const RATING_COLUMNS: &str =
    "id, user_id, challenge_id, rating, difficulty_rating, clarity_rating, review, created_at, updated_at";

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ChallengeFilter) {
    qb.push(" WHERE 1 = 1");
    if filter.published_only {
        qb.push(" AND c.status = 'published'");
    }
    if let Some(difficulty) = filter.difficulty {
        qb.push(" AND c.difficulty_level = ").push_bind(difficulty.as_str());
    }
    if let Some(challenge_type) = filter.challenge_type {
        qb.push(" AND c.challenge_type = ").push_bind(challenge_type.as_str());
    }
    if let Some(category) = filter.category {
        qb.push(" AND c.category_id = ").push_bind(category);
    }
    if let Some(status) = filter.status {
        qb.push(" AND c.status = ").push_bind(status.as_str());
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND c.is_featured = ").push_bind(featured);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search);
        qb.push(" AND (c.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR c.description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

#[async_trait]
impl ChallengeRepository for SqlxChallengeRepository {
    async fn create(&self, challenge: &Challenge, tag_ids: &[i64]) -> Result<Challenge> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO challenges (title, slug, description, problem_statement, difficulty_level,
                                    challenge_type, category_id, input_format, output_format,
                                    constraints, examples, hints, test_cases, hidden_test_cases,
                                    solution_code, solution_explanation, time_limit, memory_limit,
                                    points_reward, xp_reward, status, is_featured, author_id,
                                    published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&challenge.title)
        .bind(&challenge.slug)
        .bind(&challenge.description)
        .bind(&challenge.problem_statement)
        .bind(challenge.difficulty_level.as_str())
        .bind(challenge.challenge_type.as_str())
        .bind(challenge.category_id)
        .bind(&challenge.input_format)
        .bind(&challenge.output_format)
        .bind(&challenge.constraints)
        .bind(challenge.examples.to_string())
        .bind(challenge.hints.to_string())
        .bind(challenge.test_cases.to_string())
        .bind(challenge.hidden_test_cases.to_string())
        .bind(&challenge.solution_code)
        .bind(&challenge.solution_explanation)
        .bind(challenge.time_limit)
        .bind(challenge.memory_limit)
        .bind(challenge.points_reward)
        .bind(challenge.xp_reward)
        .bind(challenge.status.as_str())
        .bind(challenge.is_featured)
        .bind(challenge.author_id)
        .bind(challenge.published_at)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create challenge")?;
        let id = result.last_insert_rowid();

        replace_tags(&mut tx, id, tag_ids).await?;
        tx.commit().await.context("Failed to commit challenge")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Challenge not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Challenge>> {
        let row = sqlx::query(&format!("SELECT {} FROM challenges c WHERE c.id = ?", CHALLENGE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get challenge by ID")?;

        match row {
            Some(row) => Ok(self.fetch_many(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update(&self, challenge: &Challenge, tag_ids: Option<&[i64]>) -> Result<Challenge> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            UPDATE challenges
            SET title = ?, slug = ?, description = ?, problem_statement = ?, difficulty_level = ?,
                challenge_type = ?, category_id = ?, input_format = ?, output_format = ?,
                constraints = ?, examples = ?, hints = ?, test_cases = ?, hidden_test_cases = ?,
                solution_code = ?, solution_explanation = ?, time_limit = ?, memory_limit = ?,
                points_reward = ?, xp_reward = ?, status = ?, is_featured = ?, published_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&challenge.title)
        .bind(&challenge.slug)
        .bind(&challenge.description)
        .bind(&challenge.problem_statement)
        .bind(challenge.difficulty_level.as_str())
        .bind(challenge.challenge_type.as_str())
        .bind(challenge.category_id)
        .bind(&challenge.input_format)
        .bind(&challenge.output_format)
        .bind(&challenge.constraints)
        .bind(challenge.examples.to_string())
        .bind(challenge.hints.to_string())
        .bind(challenge.test_cases.to_string())
        .bind(challenge.hidden_test_cases.to_string())
        .bind(&challenge.solution_code)
        .bind(&challenge.solution_explanation)
        .bind(challenge.time_limit)
        .bind(challenge.memory_limit)
        .bind(challenge.points_reward)
        .bind(challenge.xp_reward)
        .bind(challenge.status.as_str())
        .bind(challenge.is_featured)
        .bind(challenge.published_at)
        .bind(Utc::now())
        .bind(challenge.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update challenge")?;

        if let Some(tag_ids) = tag_ids {
            replace_tags(&mut tx, challenge.id, tag_ids).await?;
        }
        tx.commit().await.context("Failed to commit challenge update")?;

        self.get_by_id(challenge.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Challenge not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM challenges WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete challenge")?;
        Ok(())
    }

    async fn list(&self, filter: &ChallengeFilter, offset: i64, limit: i64) -> Result<(Vec<Challenge>, i64)> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS count FROM challenges c");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count challenges")?
            .get("count");

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM challenges c", CHALLENGE_COLUMNS));
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY c.created_at DESC, c.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list challenges")?;

        Ok((self.fetch_many(rows).await?, total))
    }

    async fn featured(&self, limit: i64) -> Result<Vec<Challenge>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM challenges c WHERE c.status = 'published' AND c.is_featured = 1 ORDER BY c.created_at DESC, c.id DESC LIMIT ?",
            CHALLENGE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list featured challenges")?;

        self.fetch_many(rows).await
    }

    async fn slug_exists(&self, slug: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM challenges WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check challenge slug")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    // ========================================================================
    // Ratings
    // ========================================================================

    async fn get_rating(&self, id: i64) -> Result<Option<ChallengeRating>> {
        let row = sqlx::query(&format!("SELECT {} FROM challenge_ratings WHERE id = ?", RATING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get challenge rating")?;

        Ok(row.as_ref().map(row_to_rating))
    }

    async fn list_ratings(
        &self,
        viewer_id: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ChallengeRating>, i64)> {
        let scope = if viewer_id.is_some() {
            "WHERE user_id = ? OR review != ''"
        } else {
            "WHERE ? IS NULL"
        };

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM challenge_ratings {}", scope))
            .bind(viewer_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count challenge ratings")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM challenge_ratings {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            RATING_COLUMNS, scope
        ))
        .bind(viewer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list challenge ratings")?;

        Ok((rows.iter().map(row_to_rating).collect(), total))
    }

    async fn upsert_rating(
        &self,
        user_id: i64,
        challenge_id: i64,
        input: &ChallengeRatingInput,
    ) -> Result<ChallengeRating> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO challenge_ratings (user_id, challenge_id, rating, difficulty_rating, clarity_rating, review, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, challenge_id) DO UPDATE SET
                rating = excluded.rating,
                difficulty_rating = excluded.difficulty_rating,
                clarity_rating = excluded.clarity_rating,
                review = excluded.review,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(input.rating)
        .bind(input.difficulty_rating)
        .bind(input.clarity_rating)
        .bind(&input.review)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to save challenge rating")?;

        self.refresh_average_rating(challenge_id).await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM challenge_ratings WHERE user_id = ? AND challenge_id = ?",
            RATING_COLUMNS
        ))
        .bind(user_id)
        .bind(challenge_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to reload challenge rating")?;

        Ok(row_to_rating(&row))
    }

    async fn update_rating(&self, id: i64, input: &ChallengeRatingInput) -> Result<ChallengeRating> {
        sqlx::query(
            r#"
            UPDATE challenge_ratings
            SET rating = ?, difficulty_rating = ?, clarity_rating = ?, review = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input.rating)
        .bind(input.difficulty_rating)
        .bind(input.clarity_rating)
        .bind(&input.review)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update challenge rating")?;

        let rating = self
            .get_rating(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Challenge rating not found after update"))?;
        self.refresh_average_rating(rating.challenge_id).await?;
        Ok(rating)
    }

    async fn delete_rating(&self, id: i64) -> Result<()> {
        let Some(rating) = self.get_rating(id).await? else {
            return Ok(());
        };

        sqlx::query("DELETE FROM challenge_ratings WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete challenge rating")?;

        self.refresh_average_rating(rating.challenge_id).await
    }

    // ========================================================================
    // Favorites
    // ========================================================================

    async fn get_favorite(&self, id: i64) -> Result<Option<ChallengeFavorite>> {
        let row = sqlx::query("SELECT id, user_id, challenge_id, created_at FROM challenge_favorites WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get favorite")?;

        Ok(row.as_ref().map(row_to_favorite))
    }

    async fn find_favorite(&self, user_id: i64, challenge_id: i64) -> Result<Option<ChallengeFavorite>> {
        let row = sqlx::query(
            "SELECT id, user_id, challenge_id, created_at FROM challenge_favorites WHERE user_id = ? AND challenge_id = ?",
        )
        .bind(user_id)
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find favorite")?;

        Ok(row.as_ref().map(row_to_favorite))
    }

    async fn add_favorite(&self, user_id: i64, challenge_id: i64) -> Result<ChallengeFavorite> {
        sqlx::query(
            "INSERT OR IGNORE INTO challenge_favorites (user_id, challenge_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to add favorite")?;

        self.find_favorite(user_id, challenge_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Favorite not found after insert"))
    }

    async fn delete_favorite(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM challenge_favorites WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete favorite")?;
        Ok(())
    }

    async fn list_favorites(&self, user_id: i64, offset: i64, limit: i64) -> Result<(Vec<ChallengeFavorite>, i64)> {
        let count_row = sqlx::query("SELECT COUNT(*) AS count FROM challenge_favorites WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count favorites")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, challenge_id, created_at
            FROM challenge_favorites
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list favorites")?;

        Ok((rows.iter().map(row_to_favorite).collect(), total))
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    async fn count_published(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM challenges WHERE status = 'published'")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count published challenges")?;
        Ok(row.get("count"))
    }

    async fn count_solved(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT s.challenge_id) AS count
            FROM submissions s
            JOIN challenges c ON c.id = s.challenge_id
            WHERE s.user_id = ? AND s.status = 'accepted' AND c.status = 'published'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count solved challenges")?;
        Ok(row.get("count"))
    }

    async fn count_attempted(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(DISTINCT challenge_id) AS count FROM submissions WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count attempted challenges")?;
        Ok(row.get("count"))
    }

    async fn difficulty_progress(&self, user_id: i64) -> Result<Vec<DifficultyCounts>> {
        let rows = sqlx::query(
            r#"
            SELECT c.difficulty_level,
                   COUNT(*) AS total,
                   SUM(CASE WHEN EXISTS (
                       SELECT 1 FROM submissions s
                       WHERE s.challenge_id = c.id AND s.user_id = ? AND s.status = 'accepted'
                   ) THEN 1 ELSE 0 END) AS solved
            FROM challenges c
            WHERE c.status = 'published'
            GROUP BY c.difficulty_level
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute difficulty progress")?;

        let mut counts: Vec<DifficultyCounts> = ChallengeDifficulty::ALL
            .iter()
            .map(|difficulty| DifficultyCounts {
                difficulty: *difficulty,
                total: 0,
                solved: 0,
            })
            .collect();

        for row in rows {
            let level: String = row.get("difficulty_level");
            if let Ok(difficulty) = ChallengeDifficulty::from_str(&level) {
                if let Some(entry) = counts.iter_mut().find(|c| c.difficulty == difficulty) {
                    entry.total = row.get("total");
                    entry.solved = row.get("solved");
                }
            }
        }

        Ok(counts)
    }

    async fn unsolved_by_difficulty(
        &self,
        user_id: i64,
        difficulties: &[ChallengeDifficulty],
        exclude_attempted: bool,
        limit: i64,
    ) -> Result<Vec<Challenge>> {
        if difficulties.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM challenges c WHERE c.status = 'published' AND c.difficulty_level IN (",
            CHALLENGE_COLUMNS
        ));
        let mut separated = query.separated(", ");
        for difficulty in difficulties {
            separated.push_bind(difficulty.as_str());
        }
        separated.push_unseparated(")");

        if exclude_attempted {
            query
                .push(" AND c.id NOT IN (SELECT challenge_id FROM submissions WHERE user_id = ")
                .push_bind(user_id)
                .push(")");
        } else {
            query
                .push(" AND c.id NOT IN (SELECT challenge_id FROM submissions WHERE status = 'accepted' AND user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        query
            .push(" ORDER BY c.is_featured DESC, c.created_at DESC, c.id DESC LIMIT ")
            .push_bind(limit);

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to load recommendations")?;

        self.fetch_many(rows).await
    }

    async fn leaderboard(&self, challenge_id: i64, limit: i64) -> Result<Vec<ChallengeLeaderEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.email,
                   MAX(s.score) AS best_score,
                   MIN(s.execution_time) AS best_time
            FROM submissions s
            JOIN users u ON u.id = s.user_id
            WHERE s.challenge_id = ? AND s.status = 'accepted'
            GROUP BY u.id
            ORDER BY best_score DESC, best_time IS NULL, best_time ASC, u.id ASC
            LIMIT ?
            "#,
        )
        .bind(challenge_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load challenge leaderboard")?;

        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, row)| ChallengeLeaderEntry {
                rank: i as i64 + 1,
                user_id: row.get("id"),
                name: display_name(row),
                best_score: row.get("best_score"),
                best_time: row.get("best_time"),
            })
            .collect())
    }
}

// ============================================================================
// Connection-level helpers
// ============================================================================

/// Recount submissions and distinct solvers for a challenge
pub async fn refresh_counters(conn: &mut SqliteConnection, challenge_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE challenges
        SET submission_count = (SELECT COUNT(*) FROM submissions WHERE challenge_id = ?),
            solved_count = (SELECT COUNT(DISTINCT user_id) FROM submissions WHERE challenge_id = ? AND status = 'accepted')
        WHERE id = ?
        "#,
    )
    .bind(challenge_id)
    .bind(challenge_id)
    .bind(challenge_id)
    .execute(&mut *conn)
    .await
    .context("Failed to refresh challenge counters")?;
    Ok(())
}

async fn replace_tags(conn: &mut SqliteConnection, challenge_id: i64, tag_ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM challenge_tags WHERE challenge_id = ?")
        .bind(challenge_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear challenge tags")?;
    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO challenge_tags (challenge_id, tag_id) VALUES (?, ?)")
            .bind(challenge_id)
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .context("Failed to attach challenge tag")?;
    }
    Ok(())
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_challenge(row: &SqliteRow) -> Result<Challenge> {
    Ok(Challenge {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
        problem_statement: row.get("problem_statement"),
        difficulty_level: parse_enum(row, "difficulty_level")?,
        challenge_type: parse_enum(row, "challenge_type")?,
        category_id: row.get("category_id"),
        tags: Vec::new(),
        input_format: row.get("input_format"),
        output_format: row.get("output_format"),
        constraints: row.get("constraints"),
        examples: parse_json(row, "examples"),
        hints: parse_json(row, "hints"),
        test_cases: parse_json(row, "test_cases"),
        hidden_test_cases: parse_json(row, "hidden_test_cases"),
        solution_code: row.get("solution_code"),
        solution_explanation: row.get("solution_explanation"),
        time_limit: row.get("time_limit"),
        memory_limit: row.get("memory_limit"),
        points_reward: row.get("points_reward"),
        xp_reward: row.get("xp_reward"),
        status: parse_enum(row, "status")?,
        is_featured: row.get("is_featured"),
        author_id: row.get("author_id"),
        submission_count: row.get("submission_count"),
        solved_count: row.get("solved_count"),
        average_rating: row.get("average_rating"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_rating(row: &SqliteRow) -> ChallengeRating {
    ChallengeRating {
        id: row.get("id"),
        user_id: row.get("user_id"),
        challenge_id: row.get("challenge_id"),
        rating: row.get("rating"),
        difficulty_rating: row.get("difficulty_rating"),
        clarity_rating: row.get("clarity_rating"),
        review: row.get("review"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_favorite(row: &SqliteRow) -> ChallengeFavorite {
    ChallengeFavorite {
        id: row.get("id"),
        user_id: row.get("user_id"),
        challenge_id: row.get("challenge_id"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::test_support;
    use crate::models::{ChallengeStatus, ChallengeType, UserRole};
    use serde_json::json;

    pub(crate) fn new_challenge(title: &str, author_id: i64) -> Challenge {
        let now = Utc::now();
        Challenge {
            id: 0,
            title: title.to_string(),
            slug: title.to_lowercase().replace(' ', "-"),
            description: String::new(),
            problem_statement: "Sum the emissions".to_string(),
            difficulty_level: ChallengeDifficulty::Beginner,
            challenge_type: ChallengeType::ClimateAction,
            category_id: None,
            tags: Vec::new(),
            input_format: String::new(),
            output_format: String::new(),
            constraints: String::new(),
            examples: json!([]),
            hints: json!([]),
            test_cases: json!([{"input": "1 2", "expected_output": "3"}]),
            hidden_test_cases: json!([]),
            solution_code: String::new(),
            solution_explanation: String::new(),
            time_limit: 1000,
            memory_limit: 256,
            points_reward: 100,
            xp_reward: 50,
            status: ChallengeStatus::Published,
            is_featured: false,
            author_id,
            submission_count: 0,
            solved_count: 0,
            average_rating: 0.0,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    async fn submit(pool: &SqlitePool, user_id: i64, challenge_id: i64, status: &str, time: Option<i64>, score: i64) {
        sqlx::query(
            "INSERT INTO submissions (user_id, challenge_id, code, language, status, score, execution_time, submitted_at) VALUES (?, ?, 'x', 'python', ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(status)
        .bind(score)
        .bind(time)
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_json_columns_round_trip() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let repo = SqlxChallengeRepository::new(pool);

        let created = repo.create(&new_challenge("Sum It", author.id), &[]).await.unwrap();
        assert_eq!(created.test_cases[0]["expected_output"], "3");
        assert!(created.is_published());
    }

    #[tokio::test]
    async fn test_counters_and_leaderboard() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let fast = test_support::user(&pool, "fast@example.com", UserRole::Student).await;
        let slow = test_support::user(&pool, "slow@example.com", UserRole::Student).await;
        let repo = SqlxChallengeRepository::new(pool.clone());
        let challenge = repo.create(&new_challenge("Sum It", author.id), &[]).await.unwrap();

        submit(&pool, slow.id, challenge.id, "accepted", Some(900), 100).await;
        submit(&pool, fast.id, challenge.id, "wrong_answer", Some(50), 40).await;
        submit(&pool, fast.id, challenge.id, "accepted", Some(100), 100).await;

        let mut conn = pool.acquire().await.unwrap();
        refresh_counters(&mut conn, challenge.id).await.unwrap();
        drop(conn);

        let reloaded = repo.get_by_id(challenge.id).await.unwrap().unwrap();
        assert_eq!(reloaded.submission_count, 3);
        assert_eq!(reloaded.solved_count, 2);
        assert_eq!(reloaded.success_rate(), 66.7);

        let board = repo.leaderboard(challenge.id, 100).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].user_id, fast.id);
        assert_eq!(board[0].best_time, Some(100));
        assert_eq!(board[1].rank, 2);
    }

    #[tokio::test]
    async fn test_rating_average() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let a = test_support::user(&pool, "a@example.com", UserRole::Student).await;
        let b = test_support::user(&pool, "b@example.com", UserRole::Student).await;
        let repo = SqlxChallengeRepository::new(pool);
        let challenge = repo.create(&new_challenge("Sum It", author.id), &[]).await.unwrap();

        let input = |rating| ChallengeRatingInput {
            rating,
            difficulty_rating: 3,
            clarity_rating: 3,
            review: String::new(),
        };
        repo.upsert_rating(a.id, challenge.id, &input(5)).await.unwrap();
        let b_rating = repo.upsert_rating(b.id, challenge.id, &input(2)).await.unwrap();
        repo.upsert_rating(a.id, challenge.id, &input(4)).await.unwrap();

        assert_eq!(repo.get_by_id(challenge.id).await.unwrap().unwrap().average_rating, 3.0);

        repo.delete_rating(b_rating.id).await.unwrap();
        assert_eq!(repo.get_by_id(challenge.id).await.unwrap().unwrap().average_rating, 4.0);

        let (_, total) = repo.list_ratings(Some(b.id), 0, 20).await.unwrap();
        assert_eq!(total, 0);
        let (_, total) = repo.list_ratings(None, 0, 20).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_progress_and_recommendations() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let repo = SqlxChallengeRepository::new(pool.clone());

        let easy = repo.create(&new_challenge("Easy One", author.id), &[]).await.unwrap();
        repo.create(&new_challenge("Easy Two", author.id), &[]).await.unwrap();
        let mut hard = new_challenge("Hard One", author.id);
        hard.difficulty_level = ChallengeDifficulty::Intermediate;
        hard.points_reward = 200;
        repo.create(&hard, &[]).await.unwrap();

        let fresh = repo
            .unsolved_by_difficulty(student.id, &[ChallengeDifficulty::Beginner], true, 10)
            .await
            .unwrap();
        assert_eq!(fresh.len(), 2);

        submit(&pool, student.id, easy.id, "accepted", Some(100), 100).await;

        assert_eq!(repo.count_solved(student.id).await.unwrap(), 1);
        assert_eq!(repo.count_attempted(student.id).await.unwrap(), 1);
        assert_eq!(repo.count_published().await.unwrap(), 3);

        let progress = repo.difficulty_progress(student.id).await.unwrap();
        let beginner = progress
            .iter()
            .find(|p| p.difficulty == ChallengeDifficulty::Beginner)
            .unwrap();
        assert_eq!((beginner.total, beginner.solved), (2, 1));
        assert_eq!(progress.len(), 4);

        let next = repo
            .unsolved_by_difficulty(
                student.id,
                &[ChallengeDifficulty::Beginner, ChallengeDifficulty::Intermediate],
                false,
                10,
            )
            .await
            .unwrap();
        assert_eq!(next.len(), 2);
        assert!(next.iter().all(|c| c.id != easy.id));
    }

    #[tokio::test]
    async fn test_favorites() {
        let pool = test_support::pool().await;
        let author = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let repo = SqlxChallengeRepository::new(pool);
        let challenge = repo.create(&new_challenge("Sum It", author.id), &[]).await.unwrap();

        let favorite = repo.add_favorite(student.id, challenge.id).await.unwrap();
        let again = repo.add_favorite(student.id, challenge.id).await.unwrap();
        assert_eq!(favorite.id, again.id);
        assert_eq!(repo.list_favorites(student.id, 0, 20).await.unwrap().1, 1);

        repo.delete_favorite(favorite.id).await.unwrap();
        assert!(repo.find_favorite(student.id, challenge.id).await.unwrap().is_none());
    }
}
