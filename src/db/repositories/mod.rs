//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the tables of one aggregate.
//!
//! Writes that must share a transaction with the gamification cascade are
//! exposed as free functions taking `&mut SqliteConnection`; callers pass
//! `&mut *tx`. While a transaction is open, never go back to the pool.

pub mod carbon;
pub mod category;
pub mod challenge;
pub mod class;
pub mod discussion;
pub mod gamification;
pub mod leaderboard;
pub mod lesson;
pub mod quiz;
pub mod rating;
pub mod submission;
pub mod tag;
pub mod user;

pub use carbon::{CarbonRepository, SqlxCarbonRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use challenge::{ChallengeRepository, SqlxChallengeRepository};
pub use class::{ClassRepository, SqlxClassRepository};
pub use discussion::{DiscussionRepository, SqlxDiscussionRepository};
pub use gamification::{GamificationRepository, SqlxGamificationRepository};
pub use leaderboard::{LeaderboardRepository, SqlxLeaderboardRepository};
pub use lesson::{LessonRepository, SqlxLessonRepository};
pub use quiz::{QuizRepository, SqlxQuizRepository};
pub use rating::{RatingRepository, SqlxRatingRepository};
pub use submission::{SqlxSubmissionRepository, SubmissionRepository};
pub use tag::{SqlxTagRepository, TagRepository, TagTarget};
pub use user::{SqlxUserRepository, UserRepository};

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Parse a TEXT column into one of the string enums
pub(crate) fn parse_enum<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    let value: String = row.get(column);
    T::from_str(&value).with_context(|| format!("Invalid value in column {}", column))
}

/// Parse a JSON TEXT column, falling back to `null` for unreadable data
pub(crate) fn parse_json(row: &SqliteRow, column: &str) -> serde_json::Value {
    let value: String = row.get(column);
    serde_json::from_str(&value).unwrap_or(serde_json::Value::Null)
}

/// Escape `%` and `_` for a LIKE pattern and wrap it in wildcards
pub(crate) fn like_pattern(search: &str) -> String {
    let escaped = search
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("solar"), "%solar%");
        assert_eq!(like_pattern(" 100%_ "), "%100\\%\\_%");
    }
}
