//! Content ratings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A 1..=5 rating of exactly one lesson or quiz
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRating {
    pub id: i64,
    pub user_id: i64,
    pub lesson_id: Option<i64>,
    pub quiz_id: Option<i64>,
    pub rating: i64,
    pub review: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a rating is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingTarget {
    Lesson(i64),
    Quiz(i64),
}

impl ContentRating {
    pub fn target(&self) -> Option<RatingTarget> {
        match (self.lesson_id, self.quiz_id) {
            (Some(id), None) => Some(RatingTarget::Lesson(id)),
            (None, Some(id)) => Some(RatingTarget::Quiz(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingInput {
    pub lesson_id: Option<i64>,
    pub quiz_id: Option<i64>,
    pub rating: i64,
    #[serde(default)]
    pub review: String,
}

impl RatingInput {
    /// The single target named by the input, if exactly one is set
    pub fn target(&self) -> Option<RatingTarget> {
        match (self.lesson_id, self.quiz_id) {
            (Some(id), None) => Some(RatingTarget::Lesson(id)),
            (None, Some(id)) => Some(RatingTarget::Quiz(id)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_target() {
        let input = RatingInput {
            lesson_id: Some(1),
            rating: 5,
            ..Default::default()
        };
        assert_eq!(input.target(), Some(RatingTarget::Lesson(1)));

        let both = RatingInput {
            lesson_id: Some(1),
            quiz_id: Some(2),
            rating: 5,
            ..Default::default()
        };
        assert_eq!(both.target(), None);
        assert_eq!(RatingInput::default().target(), None);
    }
}
