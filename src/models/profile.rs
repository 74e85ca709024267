//! Learner and teacher profiles

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Points needed to advance one level
pub const POINTS_PER_LEVEL: i64 = 1000;

/// Level reached with the given point total (starts at 1)
pub fn level_for_points(total_points: i64) -> i64 {
    total_points.max(0) / POINTS_PER_LEVEL + 1
}

/// Progress through the current level as a percentage in 0..=100
pub fn level_progress(total_points: i64) -> f64 {
    let total = total_points.max(0);
    let level = level_for_points(total);
    let into_level = total - (level - 1) * POINTS_PER_LEVEL;
    (into_level as f64 / POINTS_PER_LEVEL as f64 * 100.0).min(100.0)
}

/// Per-user profile holding identity extras and gamification totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub user_id: i64,
    pub bio: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: String,
    pub grade_level: Option<i64>,
    pub school_name: String,
    pub city: String,
    pub country: String,
    pub total_points: i64,
    pub level: i64,
    pub experience_points: i64,
    pub streak_days: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub privacy_public_profile: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn level_progress(&self) -> f64 {
        level_progress(self.total_points)
    }
}

/// Profile fields a user may edit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileInput {
    pub bio: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    pub grade_level: Option<i64>,
    pub school_name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub privacy_public_profile: Option<bool>,
}

/// Extra record kept for every teacher account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherProfile {
    pub id: i64,
    pub user_id: i64,
    pub employee_id: Option<String>,
    pub department: String,
    pub subjects: Vec<String>,
    pub years_of_experience: i64,
    pub qualifications: String,
    pub is_verified: bool,
    pub verification_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTeacherProfileInput {
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub years_of_experience: Option<i64>,
    pub qualifications: Option<String>,
    /// Admin only
    pub is_verified: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_for_points(0), 1);
        assert_eq!(level_for_points(999), 1);
        assert_eq!(level_for_points(1000), 2);
        assert_eq!(level_for_points(2500), 3);
        assert_eq!(level_for_points(-50), 1);
    }

    #[test]
    fn test_level_progress() {
        assert_eq!(level_progress(0), 0.0);
        assert_eq!(level_progress(250), 25.0);
        assert_eq!(level_progress(1500), 50.0);
    }

    proptest! {
        #[test]
        fn level_progress_in_range(points in 0i64..10_000_000) {
            let progress = level_progress(points);
            prop_assert!((0.0..=100.0).contains(&progress));
            prop_assert!(level_for_points(points) >= 1);
            prop_assert_eq!(level_for_points(points), points / 1000 + 1);
        }
    }
}
