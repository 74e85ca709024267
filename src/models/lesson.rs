//! Lesson model
//!
//! This module provides:
//! - `Lesson` with its tags, prerequisites and derived statistics
//! - `ContentType` and `Difficulty` enums
//! - `LessonCompletion` records
//! - input and filter types used by the lesson service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

string_enum! {
    /// How a lesson is delivered
    pub enum ContentType {
        Text => "text",
        Video => "video",
        Interactive => "interactive",
        Mixed => "mixed",
    }
    default = Text;
}

string_enum! {
    /// Difficulty of lessons and quizzes
    pub enum Difficulty {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
    }
    default = Beginner;
}

/// Lesson entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub content: String,
    pub category_id: i64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub content_type: ContentType,
    pub difficulty_level: Difficulty,
    /// Minutes, 1..=300
    pub estimated_duration: i64,
    pub thumbnail: String,
    pub video_url: String,
    /// 1..=100
    pub points_reward: i64,
    pub author_id: i64,
    /// Lesson ids that should be completed first
    #[serde(default)]
    pub prerequisites: Vec<i64>,
    pub is_published: bool,
    pub is_featured: bool,
    pub sort_order: i64,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_count: i64,
    /// Mean rating rounded to one decimal, `None` while unrated
    #[serde(default)]
    pub average_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a lesson
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub category_id: i64,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub difficulty_level: Difficulty,
    #[serde(default = "default_duration")]
    pub estimated_duration: i64,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default = "default_points")]
    pub points_reward: i64,
    #[serde(default)]
    pub prerequisite_ids: Vec<i64>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub sort_order: i64,
}

fn default_duration() -> i64 {
    10
}

fn default_points() -> i64 {
    10
}

/// Input for updating a lesson; unset fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLessonInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<i64>,
    pub tag_ids: Option<Vec<i64>>,
    pub content_type: Option<ContentType>,
    pub difficulty_level: Option<Difficulty>,
    pub estimated_duration: Option<i64>,
    pub thumbnail: Option<String>,
    pub video_url: Option<String>,
    pub points_reward: Option<i64>,
    pub prerequisite_ids: Option<Vec<i64>>,
    pub is_published: Option<bool>,
    pub is_featured: Option<bool>,
    pub sort_order: Option<i64>,
}

/// Filters for lesson lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LessonFilter {
    pub category: Option<i64>,
    pub difficulty: Option<Difficulty>,
    pub content_type: Option<ContentType>,
    pub featured: Option<bool>,
    /// Matched against title and description
    pub search: Option<String>,
    /// Restrict to published lessons
    #[serde(skip)]
    pub published_only: bool,
}

/// A user's completion of a lesson
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonCompletion {
    pub id: i64,
    pub user_id: i64,
    pub lesson_id: i64,
    pub completed_at: DateTime<Utc>,
    /// Minutes
    pub time_spent: i64,
}
