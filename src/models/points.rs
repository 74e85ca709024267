//! Point ledger and achievements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Why points were granted or taken
    pub enum TransactionType {
        LessonCompleted => "lesson_completed",
        QuizCompleted => "quiz_completed",
        QuizPassed => "quiz_passed",
        ChallengeSolved => "challenge_solved",
        DailyLogin => "daily_login",
        StreakBonus => "streak_bonus",
        BadgeEarned => "badge_earned",
        Achievement => "achievement",
        AdminAdjustment => "admin_adjustment",
        ReferralBonus => "referral_bonus",
        ContestReward => "contest_reward",
        Penalty => "penalty",
    }
    default = AdminAdjustment;
}

string_enum! {
    pub enum AchievementType {
        FirstLesson => "first_lesson",
        FirstQuiz => "first_quiz",
        FirstChallenge => "first_challenge",
        StreakMilestone => "streak_milestone",
        PointsMilestone => "points_milestone",
        PerfectQuiz => "perfect_quiz",
        SpeedDemon => "speed_demon",
        HelpingHand => "helping_hand",
        EarlyBird => "early_bird",
        NightOwl => "night_owl",
    }
    default = FirstLesson;
}

/// Largest absolute value of a single ledger row
pub const MAX_TRANSACTION_POINTS: i64 = 10_000;

/// Immutable ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: i64,
    pub user_id: i64,
    pub points: i64,
    pub transaction_type: TransactionType,
    pub description: String,
    pub reference_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Ledger row to be written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: i64,
    pub points: i64,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reference_id: String,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

impl NewTransaction {
    pub fn new(
        user_id: i64,
        points: i64,
        transaction_type: TransactionType,
        description: impl Into<String>,
        reference_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            points,
            transaction_type,
            description: description.into(),
            reference_id: reference_id.into(),
            metadata: empty_object(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

/// A one-off accomplishment, unique per (user, type, reference)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: i64,
    pub user_id: i64,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    pub points_awarded: i64,
    pub reference_id: String,
    pub metadata: serde_json::Value,
    pub achieved_at: DateTime<Utc>,
}

/// Achievement to be granted
#[derive(Debug, Clone)]
pub struct NewAchievement {
    pub user_id: i64,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    pub points: i64,
    pub reference_id: String,
    pub metadata: serde_json::Value,
}

impl NewAchievement {
    pub fn new(
        user_id: i64,
        achievement_type: AchievementType,
        title: impl Into<String>,
        description: impl Into<String>,
        points: i64,
    ) -> Self {
        Self {
            user_id,
            achievement_type,
            title: title.into(),
            description: description.into(),
            points,
            reference_id: String::new(),
            metadata: empty_object(),
        }
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = reference_id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Count and point sum of one group of ledger rows, achievements or badges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTotal {
    pub key: String,
    pub count: i64,
    pub points: i64,
}

/// Site-wide gamification totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemTotals {
    pub total_users: i64,
    pub total_points_awarded: i64,
    pub total_transactions: i64,
    pub total_badges_earned: i64,
    pub total_achievements: i64,
}
