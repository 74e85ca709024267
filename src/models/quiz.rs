//! Quiz, question and attempt models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

string_enum! {
    pub enum QuizType {
        Practice => "practice",
        Assessment => "assessment",
        Challenge => "challenge",
    }
    default = Practice;
}

string_enum! {
    pub enum QuestionType {
        MultipleChoice => "multiple_choice",
        TrueFalse => "true_false",
        ShortAnswer => "short_answer",
        Essay => "essay",
        Matching => "matching",
        FillBlank => "fill_blank",
    }
    default = MultipleChoice;
}

impl QuestionType {
    /// Answered by picking one of the stored answers
    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::TrueFalse)
    }

    /// Answered with free text compared against the correct answers
    pub fn is_text_match(&self) -> bool {
        matches!(self, QuestionType::ShortAnswer | QuestionType::FillBlank)
    }
}

/// Quiz entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub instructions: String,
    pub lesson_id: Option<i64>,
    pub category_id: i64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub author_id: i64,
    pub quiz_type: QuizType,
    /// Minutes
    pub time_limit: Option<i64>,
    pub max_attempts: i64,
    pub passing_score: i64,
    pub points_reward: i64,
    pub shuffle_questions: bool,
    pub shuffle_answers: bool,
    pub show_correct_answers: bool,
    pub allow_review: bool,
    pub is_published: bool,
    pub is_featured: bool,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub question_count: i64,
    #[serde(default)]
    pub attempt_count: i64,
    #[serde(default)]
    pub average_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    pub lesson_id: Option<i64>,
    pub category_id: i64,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub quiz_type: QuizType,
    pub time_limit: Option<i64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    #[serde(default = "default_passing_score")]
    pub passing_score: i64,
    #[serde(default = "default_quiz_points")]
    pub points_reward: i64,
    #[serde(default = "default_true")]
    pub shuffle_questions: bool,
    #[serde(default = "default_true")]
    pub shuffle_answers: bool,
    #[serde(default = "default_true")]
    pub show_correct_answers: bool,
    #[serde(default = "default_true")]
    pub allow_review: bool,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub is_featured: bool,
}

fn default_max_attempts() -> i64 {
    3
}

fn default_passing_score() -> i64 {
    70
}

fn default_quiz_points() -> i64 {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateQuizInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub lesson_id: Option<i64>,
    pub category_id: Option<i64>,
    pub tag_ids: Option<Vec<i64>>,
    pub quiz_type: Option<QuizType>,
    /// 0 removes the limit
    pub time_limit: Option<i64>,
    pub max_attempts: Option<i64>,
    pub passing_score: Option<i64>,
    pub points_reward: Option<i64>,
    pub shuffle_questions: Option<bool>,
    pub shuffle_answers: Option<bool>,
    pub show_correct_answers: Option<bool>,
    pub allow_review: Option<bool>,
    pub is_published: Option<bool>,
    pub is_featured: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizFilter {
    pub category: Option<i64>,
    pub lesson: Option<i64>,
    pub quiz_type: Option<QuizType>,
    pub featured: Option<bool>,
    pub search: Option<String>,
    #[serde(skip)]
    pub published_only: bool,
}

/// Question with its answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub explanation: String,
    /// 1..=10
    pub points: i64,
    pub sort_order: i64,
    #[serde(default)]
    pub answers: Vec<Answer>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Ids of the answers marked correct
    pub fn correct_answer_ids(&self) -> Vec<i64> {
        self.answers
            .iter()
            .filter(|a| a.is_correct)
            .map(|a| a.id)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub answer_text: String,
    pub is_correct: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerInput {
    pub answer_text: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub sort_order: i64,
}

/// Question with nested answers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionInput {
    pub quiz_id: i64,
    pub question_text: String,
    #[serde(default)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub explanation: String,
    #[serde(default = "default_question_points")]
    pub points: i64,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub answers: Vec<AnswerInput>,
}

fn default_question_points() -> i64 {
    1
}

/// Question update; a present `answers` list replaces the stored answers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateQuestionInput {
    pub question_text: Option<String>,
    pub question_type: Option<QuestionType>,
    pub explanation: Option<String>,
    pub points: Option<i64>,
    pub sort_order: Option<i64>,
    pub answers: Option<Vec<AnswerInput>>,
}

/// One finished (or in-progress) run through a quiz
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    /// 0..=100
    pub score: i64,
    pub total_questions: i64,
    pub correct_answers: i64,
    /// Seconds
    pub time_taken: i64,
    pub is_passed: bool,
    pub attempt_number: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Stored answer to one question within an attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnswer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_answer_id: Option<i64>,
    pub text_answer: String,
    pub is_correct: bool,
    pub points_earned: i64,
}

/// Answer as submitted by the learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: i64,
    pub answer_id: Option<i64>,
    pub text_answer: Option<String>,
}
