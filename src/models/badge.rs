//! Badge model and criteria evaluation
//!
//! A badge's `criteria` is a JSON object of count thresholds, for example
//! `{"lessons_completed": 1}` or `{"difficulty_challenges": {"advanced": 3}}`.
//! Every key must hold, together with `points_required`, for the badge to
//! be awarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::round1;

string_enum! {
    pub enum BadgeType {
        Achievement => "achievement",
        Milestone => "milestone",
        Special => "special",
        Seasonal => "seasonal",
    }
    default = Achievement;
}

string_enum! {
    pub enum Rarity {
        Common => "common",
        Uncommon => "uncommon",
        Rare => "rare",
        Epic => "epic",
        Legendary => "legendary",
    }
    default = Common;
}

impl Rarity {
    /// Display color for the rarity
    pub fn color(&self) -> &'static str {
        match self {
            Rarity::Common => "#9CA3AF",
            Rarity::Uncommon => "#10B981",
            Rarity::Rare => "#3B82F6",
            Rarity::Epic => "#8B5CF6",
            Rarity::Legendary => "#F59E0B",
        }
    }
}

/// Badge catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub badge_type: BadgeType,
    pub rarity: Rarity,
    pub rarity_color: String,
    pub points_required: i64,
    pub criteria: serde_json::Value,
    pub is_active: bool,
    pub is_hidden: bool,
    pub earned_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub badge_type: BadgeType,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default)]
    pub points_required: i64,
    #[serde(default = "empty_object")]
    pub criteria: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBadgeInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub badge_type: Option<BadgeType>,
    pub rarity: Option<Rarity>,
    pub points_required: Option<i64>,
    pub criteria: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub is_hidden: Option<bool>,
}

/// A badge held by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBadge {
    pub id: i64,
    pub user_id: i64,
    pub badge_id: i64,
    pub earned_at: DateTime<Utc>,
    pub is_displayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<Badge>,
}

/// Activity totals that badge criteria are checked against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityCounts {
    pub total_points: i64,
    pub lessons_completed: i64,
    pub quizzes_completed: i64,
    /// Distinct challenges with an accepted submission
    pub challenges_solved: i64,
    pub streak_days: i64,
    /// Attempts scoring 100
    pub perfect_quizzes: i64,
    /// Accepted submissions that ran under 500 ms
    pub fast_solutions: i64,
    /// Distinct solved challenges per difficulty
    pub solved_by_difficulty: HashMap<String, i64>,
}

impl ActivityCounts {
    fn count_for(&self, key: &str) -> Option<i64> {
        match key {
            "lessons_completed" => Some(self.lessons_completed),
            "quizzes_completed" => Some(self.quizzes_completed),
            "challenges_solved" => Some(self.challenges_solved),
            "streak_days" => Some(self.streak_days),
            "perfect_quizzes" => Some(self.perfect_quizzes),
            "fast_solutions" => Some(self.fast_solutions),
            _ => None,
        }
    }
}

/// One (key, current, required) line of a criteria check
fn requirements(badge: &Badge, counts: &ActivityCounts) -> Vec<(String, i64, i64)> {
    let mut lines = Vec::new();

    if badge.points_required > 0 {
        lines.push((
            "total_points".to_string(),
            counts.total_points,
            badge.points_required,
        ));
    }

    if let Some(criteria) = badge.criteria.as_object() {
        for (key, value) in criteria {
            if key == "difficulty_challenges" {
                if let Some(per_difficulty) = value.as_object() {
                    for (difficulty, required) in per_difficulty {
                        let current = counts
                            .solved_by_difficulty
                            .get(difficulty)
                            .copied()
                            .unwrap_or(0);
                        lines.push((
                            format!("{}_challenges", difficulty),
                            current,
                            required.as_i64().unwrap_or(0),
                        ));
                    }
                }
            } else if let Some(current) = counts.count_for(key) {
                lines.push((key.clone(), current, value.as_i64().unwrap_or(0)));
            }
        }
    }

    lines
}

/// Whether every requirement of an active badge holds
pub fn criteria_met(badge: &Badge, counts: &ActivityCounts) -> bool {
    badge.is_active
        && requirements(badge, counts)
            .iter()
            .all(|(_, current, required)| current >= required)
}

/// Progress report for one badge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeProgress {
    pub badge: Badge,
    pub is_earned: bool,
    pub progress_percentage: f64,
    pub current_progress: HashMap<String, i64>,
    pub required_progress: HashMap<String, i64>,
    pub next_milestone: Option<String>,
}

/// Progress of a user toward a badge.
///
/// The percentage is the mean over all requirements of
/// `min(100, current / required * 100)`.
pub fn criteria_progress(badge: &Badge, counts: &ActivityCounts, is_earned: bool) -> BadgeProgress {
    let lines = requirements(badge, counts);

    let progress_percentage = if is_earned {
        100.0
    } else if lines.is_empty() {
        0.0
    } else {
        let sum: f64 = lines
            .iter()
            .map(|(_, current, required)| {
                if *required <= 0 {
                    100.0
                } else {
                    (*current as f64 / *required as f64 * 100.0).min(100.0)
                }
            })
            .sum();
        round1(sum / lines.len() as f64)
    };

    let next_milestone = if is_earned {
        None
    } else {
        lines
            .iter()
            .find(|(_, current, required)| current < required)
            .map(|(key, current, required)| format!("{}: {}/{}", key, current, required))
    };

    BadgeProgress {
        badge: badge.clone(),
        is_earned,
        progress_percentage,
        current_progress: lines.iter().map(|(k, c, _)| (k.clone(), *c)).collect(),
        required_progress: lines.iter().map(|(k, _, r)| (k.clone(), *r)).collect(),
        next_milestone,
    }
}

/// A recent badge award, for activity feeds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentBadgeEarner {
    pub user_id: i64,
    pub name: String,
    pub badge_id: i64,
    pub badge_name: String,
    pub rarity: Rarity,
    pub earned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn badge(points_required: i64, criteria: serde_json::Value) -> Badge {
        let now = Utc::now();
        Badge {
            id: 1,
            name: "Test".to_string(),
            description: String::new(),
            icon: String::new(),
            badge_type: BadgeType::Achievement,
            rarity: Rarity::Common,
            rarity_color: Rarity::Common.color().to_string(),
            points_required,
            criteria,
            is_active: true,
            is_hidden: false,
            earned_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_criteria_met() {
        let first_steps = badge(0, serde_json::json!({"lessons_completed": 1}));
        let mut counts = ActivityCounts::default();
        assert!(!criteria_met(&first_steps, &counts));
        counts.lessons_completed = 1;
        assert!(criteria_met(&first_steps, &counts));
    }

    #[test]
    fn test_points_required_gate() {
        let collector = badge(1000, serde_json::json!({}));
        let mut counts = ActivityCounts {
            total_points: 999,
            ..Default::default()
        };
        assert!(!criteria_met(&collector, &counts));
        counts.total_points = 1000;
        assert!(criteria_met(&collector, &counts));
    }

    #[test]
    fn test_inactive_never_met() {
        let mut b = badge(0, serde_json::json!({}));
        b.is_active = false;
        assert!(!criteria_met(&b, &ActivityCounts::default()));
    }

    #[test]
    fn test_difficulty_criteria() {
        let b = badge(0, serde_json::json!({"difficulty_challenges": {"advanced": 2}}));
        let mut counts = ActivityCounts::default();
        counts.solved_by_difficulty.insert("advanced".to_string(), 1);
        assert!(!criteria_met(&b, &counts));
        counts.solved_by_difficulty.insert("advanced".to_string(), 2);
        assert!(criteria_met(&b, &counts));
    }

    #[test]
    fn test_progress_mean_and_next_milestone() {
        let b = badge(
            0,
            serde_json::json!({"lessons_completed": 4, "quizzes_completed": 10}),
        );
        let counts = ActivityCounts {
            lessons_completed: 4,
            quizzes_completed: 3,
            ..Default::default()
        };
        let progress = criteria_progress(&b, &counts, false);
        // (100 + 30) / 2
        assert_eq!(progress.progress_percentage, 65.0);
        assert_eq!(
            progress.next_milestone.as_deref(),
            Some("quizzes_completed: 3/10")
        );
        assert_eq!(progress.required_progress.get("lessons_completed"), Some(&4));
    }

    #[test]
    fn test_earned_progress_is_full() {
        let b = badge(0, serde_json::json!({"lessons_completed": 4}));
        let progress = criteria_progress(&b, &ActivityCounts::default(), true);
        assert_eq!(progress.progress_percentage, 100.0);
        assert!(progress.next_milestone.is_none());
    }

    #[test]
    fn test_rarity_color() {
        assert_eq!(Rarity::Legendary.color(), "#F59E0B");
        assert_eq!(Rarity::default().color(), "#9CA3AF");
    }
}
