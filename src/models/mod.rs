//! Data models
//!
//! Plain structs for every EcoLearn table, the input types accepted by the
//! services, and the pagination containers shared by all list endpoints.
//! Derived values (levels, rewards, carbon results) live next to the model
//! they derive from.

/// Declare a string-backed enum stored as TEXT.
///
/// Generates `as_str`, `ALL`, `Display`, `FromStr` (case-insensitive) and
/// `Default`, with serde using the same string forms.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
        default = $default:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Database string representation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lower = s.to_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == lower)
                    .ok_or_else(|| anyhow::anyhow!(concat!("Invalid ", stringify!($name), ": {}"), s))
            }
        }
    };
}

mod badge;
mod carbon;
mod category;
mod challenge;
mod class;
mod discussion;
mod leaderboard;
mod lesson;
mod points;
mod profile;
mod quiz;
mod rating;
mod submission;
mod tag;
mod user;

pub use badge::{
    criteria_met, criteria_progress, ActivityCounts, Badge, BadgeInput, BadgeProgress, BadgeType,
    Rarity, RecentBadgeEarner, UpdateBadgeInput, UserBadge,
};
pub use carbon::{CarbonFootprint, CarbonInput, CarbonResult};
pub use category::{Category, CategoryInput, DEFAULT_CATEGORY_COLOR};
pub use challenge::{
    Challenge, ChallengeDifficulty, ChallengeFavorite, ChallengeFilter, ChallengeInput,
    ChallengeLeaderEntry, ChallengeRating, ChallengeRatingInput, ChallengeStatus, ChallengeType, UpdateChallengeInput,
};
pub use class::{ClassInput, StudentClass, UpdateClassInput};
pub use discussion::{ChallengeDiscussion, DiscussionInput};
pub use leaderboard::{
    Leaderboard, LeaderboardEntry, LeaderboardInput, LeaderboardType, UpdateLeaderboardInput,
};
pub use lesson::{
    ContentType, Difficulty, Lesson, LessonCompletion, LessonFilter, LessonInput,
    UpdateLessonInput,
};
pub use points::{
    Achievement, AchievementType, NewAchievement, NewTransaction, PointTransaction,
    SystemTotals, TransactionType, TypeTotal, MAX_TRANSACTION_POINTS,
};
pub use profile::{
    level_for_points, level_progress, TeacherProfile, UpdateProfileInput,
    UpdateTeacherProfileInput, UserProfile, POINTS_PER_LEVEL,
};
pub use quiz::{
    Answer, AnswerInput, Question, QuestionInput, QuestionType, Quiz, QuizAttempt, QuizFilter,
    QuizInput, QuizType, SubmittedAnswer, UpdateQuestionInput, UpdateQuizInput, UserAnswer,
};
pub use rating::{ContentRating, RatingInput, RatingTarget};
pub use submission::{
    compute_reward, EvaluationInput, Language, Submission, SubmissionFilter, SubmissionStatus,
};
pub use tag::Tag;
pub use user::{User, UserRole};

use serde::{Deserialize, Serialize};

/// Default page size for list endpoints
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Maximum page size for list endpoints
pub const MAX_PER_PAGE: u32 = 100;

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    /// Create a new paginated result
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Calculate the total number of pages
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        ((self.total as u64 + self.per_page as u64 - 1) / self.per_page as u64) as u32
    }

    /// Transform the items while keeping the paging metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage of `part` in `whole`, rounded to one decimal, 0 when `whole` is 0
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_clamp() {
        let params = ListParams::new(0, 500);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(params.offset(), 0);

        let params = ListParams::new(3, 20);
        assert_eq!(params.offset(), 40);
        assert_eq!(params.limit(), 20);
    }

    #[test]
    fn test_total_pages() {
        let params = ListParams::new(1, 20);
        assert_eq!(PagedResult::<i32>::new(vec![], 0, &params).total_pages(), 0);
        assert_eq!(PagedResult::<i32>::new(vec![], 20, &params).total_pages(), 1);
        assert_eq!(PagedResult::<i32>::new(vec![], 21, &params).total_pages(), 2);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn test_string_enum_round_trip() {
        use std::str::FromStr;
        for difficulty in Difficulty::ALL {
            assert_eq!(Difficulty::from_str(difficulty.as_str()).unwrap(), *difficulty);
        }
        assert_eq!(
            SubmissionStatus::from_str("WRONG_ANSWER").unwrap(),
            SubmissionStatus::WrongAnswer
        );
        assert!(Language::from_str("cobol").is_err());
        assert_eq!(
            serde_json::to_string(&TransactionType::QuizPassed).unwrap(),
            "\"quiz_passed\""
        );
    }
}
