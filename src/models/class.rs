//! Student classes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A teacher's class that students join with a code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentClass {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub teacher_id: i64,
    /// 8 characters from A-Z0-9
    pub class_code: String,
    pub is_active: bool,
    /// Number of enrolled students
    #[serde(default)]
    pub student_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClassInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}
