//! Services layer - Business logic
//!
//! Services own the rules of EcoLearn: who may see or change what, input
//! validation, and the gamification cascade that follows every learning
//! event. They coordinate repositories and the cache and never touch HTTP.
//!
//! Each service has its own error enum. Most are declared with
//! `service_error!`, which gives them the shared variants the API layer
//! maps to status codes.

/// Declare a service error enum with the standard variants.
macro_rules! service_error {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, thiserror::Error)]
        pub enum $name {
            /// Entity does not exist
            #[error("{0}")]
            NotFound(String),

            /// Invalid input
            #[error("Validation error: {0}")]
            ValidationError(String),

            /// Caller lacks permission
            #[error("Forbidden: {0}")]
            Forbidden(String),

            /// Unique value already taken
            #[error("Conflict: {0}")]
            Conflict(String),

            /// Repository or cascade failure
            #[error("Internal error: {0}")]
            InternalError(#[from] anyhow::Error),
        }

        #[allow(dead_code)]
        impl $name {
            pub(crate) fn not_found(what: &str, id: i64) -> Self {
                Self::NotFound(format!("{} not found: {}", what, id))
            }

            pub(crate) fn validation(message: impl Into<String>) -> Self {
                Self::ValidationError(message.into())
            }

            pub(crate) fn forbidden(message: impl Into<String>) -> Self {
                Self::Forbidden(message.into())
            }
        }
    };
}

pub mod badge;
pub mod carbon;
pub mod category;
pub mod challenge;
pub mod class;
pub mod discussion;
pub mod gamification;
pub mod leaderboard;
pub mod lesson;
pub mod password;
pub mod question;
pub mod quiz;
pub mod rating;
pub mod slug;
pub mod stats;
pub mod submission;
pub mod tag;
pub mod token;
pub mod user;

pub use badge::{BadgeService, BadgeServiceError};
pub use carbon::{CarbonService, CarbonServiceError};
pub use category::{CategoryService, CategoryServiceError};
pub use challenge::{ChallengeService, ChallengeServiceError};
pub use class::{ClassService, ClassServiceError};
pub use discussion::{DiscussionService, DiscussionServiceError};
pub use gamification::{CascadeOutcome, GamificationService, GamificationServiceError};
pub use leaderboard::{LeaderboardService, LeaderboardServiceError};
pub use lesson::{LessonService, LessonServiceError};
pub use password::{hash_password, verify_password};
pub use question::{QuestionService, QuestionServiceError};
pub use quiz::{QuizService, QuizServiceError};
pub use rating::{RatingService, RatingServiceError};
pub use slug::{generate_slug, unique_slug};
pub use stats::{StatsService, StatsServiceError};
pub use submission::{SubmissionService, SubmissionServiceError};
pub use tag::{TagService, TagServiceError};
pub use token::{Claims, TokenPair, TokenService, TokenType};
pub use user::{UserService, UserServiceError};

use crate::models::User;

/// Teachers and admins author content; everyone else is turned away
pub(crate) fn require_staff(user: &User) -> Result<(), String> {
    if user.is_staff() {
        Ok(())
    } else {
        Err("Teacher or admin privileges required".to_string())
    }
}

pub(crate) fn require_admin(user: &User) -> Result<(), String> {
    if user.is_admin() {
        Ok(())
    } else {
        Err("Admin privileges required".to_string())
    }
}

/// Whether the viewer may see unpublished content
pub(crate) fn sees_drafts(viewer: Option<&User>) -> bool {
    viewer.map(User::is_staff).unwrap_or(false)
}
