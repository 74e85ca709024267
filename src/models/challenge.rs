//! Coding challenge models
//!
//! This module provides:
//! - `Challenge` with its JSON-valued example/hint/test-case lists
//! - difficulty, type and status enums
//! - `ChallengeRating` and `ChallengeFavorite`
//! - input and filter types for the challenge service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{round1, Tag};

string_enum! {
    pub enum ChallengeDifficulty {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
        Expert => "expert",
    }
    default = Beginner;
}

impl ChallengeDifficulty {
    /// Allowed `points_reward` range for this difficulty
    pub fn points_band(&self) -> (i64, i64) {
        match self {
            ChallengeDifficulty::Beginner => (50, 200),
            ChallengeDifficulty::Intermediate => (100, 400),
            ChallengeDifficulty::Advanced => (200, 600),
            ChallengeDifficulty::Expert => (300, 1000),
        }
    }

    /// The next harder difficulty, if any
    pub fn next(&self) -> Option<ChallengeDifficulty> {
        match self {
            ChallengeDifficulty::Beginner => Some(ChallengeDifficulty::Intermediate),
            ChallengeDifficulty::Intermediate => Some(ChallengeDifficulty::Advanced),
            ChallengeDifficulty::Advanced => Some(ChallengeDifficulty::Expert),
            ChallengeDifficulty::Expert => None,
        }
    }
}

string_enum! {
    pub enum ChallengeType {
        WasteManagement => "waste_management",
        EnergyConservation => "energy_conservation",
        WaterConservation => "water_conservation",
        SustainableTransport => "sustainable_transport",
        TreePlanting => "tree_planting",
        Recycling => "recycling",
        ClimateAction => "climate_action",
        EcoLifestyle => "eco_lifestyle",
    }
    default = ClimateAction;
}

string_enum! {
    pub enum ChallengeStatus {
        Draft => "draft",
        Published => "published",
        Archived => "archived",
    }
    default = Draft;
}

/// Challenge entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub problem_statement: String,
    pub difficulty_level: ChallengeDifficulty,
    pub challenge_type: ChallengeType,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub input_format: String,
    pub output_format: String,
    pub constraints: String,
    pub examples: serde_json::Value,
    pub hints: serde_json::Value,
    pub test_cases: serde_json::Value,
    pub hidden_test_cases: serde_json::Value,
    pub solution_code: String,
    pub solution_explanation: String,
    /// Milliseconds
    pub time_limit: i64,
    /// Megabytes
    pub memory_limit: i64,
    pub points_reward: i64,
    pub xp_reward: i64,
    pub status: ChallengeStatus,
    pub is_featured: bool,
    pub author_id: i64,
    pub submission_count: i64,
    pub solved_count: i64,
    pub average_rating: f64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Challenge {
    pub fn is_published(&self) -> bool {
        self.status == ChallengeStatus::Published
    }

    /// Share of submissions that solved the challenge, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.submission_count == 0 {
            return 0.0;
        }
        round1(self.solved_count as f64 / self.submission_count as f64 * 100.0)
    }
}

fn empty_list() -> serde_json::Value {
    serde_json::json!([])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub problem_statement: String,
    #[serde(default)]
    pub difficulty_level: ChallengeDifficulty,
    #[serde(default)]
    pub challenge_type: ChallengeType,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub input_format: String,
    #[serde(default)]
    pub output_format: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default = "empty_list")]
    pub examples: serde_json::Value,
    #[serde(default = "empty_list")]
    pub hints: serde_json::Value,
    #[serde(default = "empty_list")]
    pub test_cases: serde_json::Value,
    #[serde(default = "empty_list")]
    pub hidden_test_cases: serde_json::Value,
    #[serde(default)]
    pub solution_code: String,
    #[serde(default)]
    pub solution_explanation: String,
    #[serde(default = "default_time_limit")]
    pub time_limit: i64,
    #[serde(default = "default_memory_limit")]
    pub memory_limit: i64,
    #[serde(default = "default_points_reward")]
    pub points_reward: i64,
    #[serde(default = "default_xp_reward")]
    pub xp_reward: i64,
    #[serde(default)]
    pub status: ChallengeStatus,
    #[serde(default)]
    pub is_featured: bool,
}

fn default_time_limit() -> i64 {
    1000
}

fn default_memory_limit() -> i64 {
    256
}

fn default_points_reward() -> i64 {
    100
}

fn default_xp_reward() -> i64 {
    50
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateChallengeInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub problem_statement: Option<String>,
    pub difficulty_level: Option<ChallengeDifficulty>,
    pub challenge_type: Option<ChallengeType>,
    pub category_id: Option<i64>,
    pub tag_ids: Option<Vec<i64>>,
    pub input_format: Option<String>,
    pub output_format: Option<String>,
    pub constraints: Option<String>,
    pub examples: Option<serde_json::Value>,
    pub hints: Option<serde_json::Value>,
    pub test_cases: Option<serde_json::Value>,
    pub hidden_test_cases: Option<serde_json::Value>,
    pub solution_code: Option<String>,
    pub solution_explanation: Option<String>,
    pub time_limit: Option<i64>,
    pub memory_limit: Option<i64>,
    pub points_reward: Option<i64>,
    pub xp_reward: Option<i64>,
    pub status: Option<ChallengeStatus>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeFilter {
    pub difficulty: Option<ChallengeDifficulty>,
    pub challenge_type: Option<ChallengeType>,
    pub category: Option<i64>,
    pub status: Option<ChallengeStatus>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    #[serde(skip)]
    pub published_only: bool,
}

/// A learner's rating of a challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRating {
    pub id: i64,
    pub user_id: i64,
    pub challenge_id: i64,
    pub rating: i64,
    pub difficulty_rating: i64,
    pub clarity_rating: i64,
    pub review: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRatingInput {
    pub rating: i64,
    pub difficulty_rating: i64,
    pub clarity_rating: i64,
    #[serde(default)]
    pub review: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeFavorite {
    pub id: i64,
    pub user_id: i64,
    pub challenge_id: i64,
    pub created_at: DateTime<Utc>,
}

/// One row of a per-challenge leaderboard: a user's best accepted run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeLeaderEntry {
    pub rank: i64,
    pub user_id: i64,
    pub name: String,
    pub best_score: i64,
    /// Fastest accepted run in ms, when timed
    pub best_time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_band() {
        assert_eq!(ChallengeDifficulty::Beginner.points_band(), (50, 200));
        assert_eq!(ChallengeDifficulty::Expert.points_band(), (300, 1000));
    }

    #[test]
    fn test_next_difficulty() {
        assert_eq!(
            ChallengeDifficulty::Beginner.next(),
            Some(ChallengeDifficulty::Intermediate)
        );
        assert_eq!(ChallengeDifficulty::Expert.next(), None);
    }

    #[test]
    fn test_challenge_type_serde() {
        let json = serde_json::to_string(&ChallengeType::SustainableTransport).unwrap();
        assert_eq!(json, "\"sustainable_transport\"");
        let parsed: ChallengeType = serde_json::from_str("\"tree_planting\"").unwrap();
        assert_eq!(parsed, ChallengeType::TreePlanting);
    }
}
