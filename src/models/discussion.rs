//! Challenge discussion threads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post on a challenge, optionally replying to another post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeDiscussion {
    pub id: i64,
    pub challenge_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub is_solution: bool,
    pub is_spoiler: bool,
    pub is_approved: bool,
    pub is_flagged: bool,
    /// Approved replies, filled in for top-level posts
    #[serde(default)]
    pub replies: Vec<ChallengeDiscussion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscussionInput {
    /// Required when creating a top-level post
    pub challenge_id: Option<i64>,
    pub content: Option<String>,
    pub is_solution: Option<bool>,
    pub is_spoiler: Option<bool>,
}
