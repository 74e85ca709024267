//! Leaderboard model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum LeaderboardType {
        GlobalPoints => "global_points",
        WeeklyPoints => "weekly_points",
        MonthlyPoints => "monthly_points",
        ChallengesSolved => "challenges_solved",
        LessonsCompleted => "lessons_completed",
        CurrentStreak => "current_streak",
        ClassPoints => "class_points",
    }
    default = GlobalPoints;
}

/// A configured leaderboard. `data` is filled in when the board is viewed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub id: i64,
    pub name: String,
    pub leaderboard_type: LeaderboardType,
    pub description: String,
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub student_class_id: Option<i64>,
    pub cached_data: Vec<LeaderboardEntry>,
    pub last_updated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ranked row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: i64,
    pub name: String,
    pub value: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardInput {
    pub name: String,
    #[serde(default)]
    pub leaderboard_type: LeaderboardType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub student_class_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLeaderboardInput {
    pub name: Option<String>,
    pub leaderboard_type: Option<LeaderboardType>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub student_class_id: Option<i64>,
}
