//! Submission model and reward computation
//!
//! Submissions are never executed. They are stored as `pending` and an admin
//! sets the outcome through the evaluation endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum Language {
        Python => "python",
        JavaScript => "javascript",
        Java => "java",
        Cpp => "cpp",
        C => "c",
        CSharp => "csharp",
        Go => "go",
        Rust => "rust",
        Kotlin => "kotlin",
        Swift => "swift",
    }
    default = Python;
}

string_enum! {
    pub enum SubmissionStatus {
        Pending => "pending",
        Running => "running",
        Accepted => "accepted",
        WrongAnswer => "wrong_answer",
        TimeLimitExceeded => "time_limit_exceeded",
        MemoryLimitExceeded => "memory_limit_exceeded",
        RuntimeError => "runtime_error",
        CompilationError => "compilation_error",
        InternalError => "internal_error",
    }
    default = Pending;
}

/// A learner's solution to a challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub user_id: i64,
    pub challenge_id: i64,
    pub code: String,
    pub language: Language,
    pub status: SubmissionStatus,
    pub score: i64,
    /// Milliseconds
    pub execution_time: Option<i64>,
    /// Megabytes
    pub memory_used: Option<i64>,
    pub test_results: serde_json::Value,
    pub passed_test_cases: i64,
    pub total_test_cases: i64,
    pub error_message: String,
    pub compilation_output: String,
    pub points_earned: i64,
    pub xp_earned: i64,
    pub submitted_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

/// Outcome recorded by an admin in place of a judge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationInput {
    pub status: SubmissionStatus,
    #[serde(default)]
    pub score: i64,
    pub execution_time: Option<i64>,
    pub memory_used: Option<i64>,
    #[serde(default)]
    pub passed_test_cases: i64,
    #[serde(default)]
    pub total_test_cases: i64,
    #[serde(default)]
    pub test_results: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub compilation_output: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionFilter {
    pub challenge: Option<i64>,
    pub language: Option<Language>,
    pub status: Option<SubmissionStatus>,
}

/// Points (or xp) earned for a submission given the challenge reward.
///
/// Accepted solutions earn the full reward with a speed bonus: x1.2 when the
/// run used under half the time limit, x1.1 under 80%. Failed solutions earn
/// 30% of the reward scaled by the share of passed test cases.
pub fn compute_reward(
    reward: i64,
    status: SubmissionStatus,
    execution_time: Option<i64>,
    time_limit: i64,
    passed_test_cases: i64,
    total_test_cases: i64,
) -> i64 {
    if status == SubmissionStatus::Accepted {
        let bonus = match execution_time {
            Some(ms) if time_limit > 0 => {
                let ratio = ms as f64 / time_limit as f64;
                if ratio < 0.5 {
                    1.2
                } else if ratio < 0.8 {
                    1.1
                } else {
                    1.0
                }
            }
            _ => 1.0,
        };
        (reward as f64 * bonus) as i64
    } else if total_test_cases > 0 {
        let passed = passed_test_cases.clamp(0, total_test_cases);
        (reward as f64 * passed as f64 / total_test_cases as f64 * 0.3) as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepted_time_bonus() {
        let accepted = SubmissionStatus::Accepted;
        assert_eq!(compute_reward(100, accepted, Some(400), 1000, 5, 5), 120);
        assert_eq!(compute_reward(100, accepted, Some(700), 1000, 5, 5), 110);
        assert_eq!(compute_reward(100, accepted, Some(900), 1000, 5, 5), 100);
        assert_eq!(compute_reward(100, accepted, None, 1000, 5, 5), 100);
    }

    #[test]
    fn test_partial_credit() {
        let wrong = SubmissionStatus::WrongAnswer;
        assert_eq!(compute_reward(100, wrong, Some(10), 1000, 5, 10), 15);
        assert_eq!(compute_reward(100, wrong, Some(10), 1000, 0, 10), 0);
        assert_eq!(compute_reward(100, wrong, None, 1000, 0, 0), 0);
    }

    proptest! {
        #[test]
        fn partial_credit_is_monotone(
            reward in 1i64..1000,
            total in 1i64..50,
            a in 0i64..50,
            b in 0i64..50,
        ) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let status = SubmissionStatus::WrongAnswer;
            let low_reward = compute_reward(reward, status, None, 1000, low.min(total), total);
            let high_reward = compute_reward(reward, status, None, 1000, high.min(total), total);
            prop_assert!(low_reward <= high_reward);
            prop_assert!(high_reward <= reward);
        }

        #[test]
        fn accepted_reward_at_least_base(reward in 1i64..1000, ms in 0i64..5000) {
            let earned = compute_reward(reward, SubmissionStatus::Accepted, Some(ms), 1000, 0, 0);
            prop_assert!(earned >= reward);
            prop_assert!(earned <= (reward as f64 * 1.2) as i64);
        }
    }
}
