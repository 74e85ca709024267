//! Category model
//!
//! Categories group lessons, quizzes and challenges by theme
//! ("Renewable Energy", "Biodiversity", ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default display color for new categories
pub const DEFAULT_CATEGORY_COLOR: &str = "#007bff";

/// Category entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Category name (unique)
    pub name: String,
    /// URL-friendly slug
    pub slug: String,
    pub description: String,
    pub icon: String,
    /// Hex color such as `#007bff`
    pub color: String,
    pub is_active: bool,
    /// Published lessons in this category
    #[serde(default)]
    pub lesson_count: i64,
    /// Published quizzes in this category
    #[serde(default)]
    pub quiz_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Create a new Category. The ID is assigned by the database.
    pub fn new(name: String, slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            slug,
            description: String::new(),
            icon: String::new(),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
            is_active: true,
            lesson_count: 0,
            quiz_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating or updating a category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}
