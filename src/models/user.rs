//! User model
//!
//! Accounts are identified by email. The role decides what a user may do:
//! students learn, teachers author content and run classes, admins manage
//! everything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique, stored lowercase)
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_email_verified: bool,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User.
    ///
    /// The password must already be hashed; see `services::password::hash_password()`.
    pub fn new(
        email: String,
        first_name: String,
        last_name: String,
        password_hash: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email,
            first_name,
            last_name,
            password_hash,
            role,
            is_email_verified: false,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// "first last", trimmed
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_teacher(&self) -> bool {
        self.role == UserRole::Teacher
    }

    pub fn is_student(&self) -> bool {
        self.role == UserRole::Student
    }

    /// Teachers and admins may author content
    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Teacher | UserRole::Admin)
    }

    /// Admins may modify anything, everyone else only what they own
    pub fn can_modify(&self, owner_id: i64) -> bool {
        self.is_admin() || self.id == owner_id
    }
}

/// User role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Learner - the default for self-registration
    Student,
    /// Teacher - authors content and manages classes
    Teacher,
    /// Administrator - full access
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Student
    }
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(UserRole::Student),
            "teacher" => Ok(UserRole::Teacher),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> User {
        User::new(
            "test@example.com".to_string(),
            "Ada".to_string(),
            "Lovelace".to_string(),
            "hash".to_string(),
            role,
        )
    }

    #[test]
    fn test_user_new() {
        let user = user(UserRole::Student);
        assert_eq!(user.id, 0);
        assert!(user.is_active);
        assert!(!user.is_email_verified);
        assert_eq!(user.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_full_name_trimmed() {
        let mut user = user(UserRole::Student);
        user.last_name = String::new();
        assert_eq!(user.full_name(), "Ada");
        user.first_name = String::new();
        assert_eq!(user.full_name(), "");
    }

    #[test]
    fn test_roles() {
        assert!(user(UserRole::Admin).is_staff());
        assert!(user(UserRole::Teacher).is_staff());
        assert!(!user(UserRole::Student).is_staff());
        assert!(user(UserRole::Teacher).is_teacher());
    }

    #[test]
    fn test_can_modify() {
        let mut admin = user(UserRole::Admin);
        admin.id = 1;
        let mut student = user(UserRole::Student);
        student.id = 2;

        assert!(admin.can_modify(2));
        assert!(student.can_modify(2));
        assert!(!student.can_modify(1));
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!(UserRole::from_str("ADMIN").unwrap(), UserRole::Admin);
        assert_eq!(UserRole::from_str("teacher").unwrap(), UserRole::Teacher);
        assert!(UserRole::from_str("editor").is_err());
        assert_eq!(UserRole::default(), UserRole::Student);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(user(UserRole::Student)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "student");
    }
}
