//! User repository
//!
//! Database operations for users, their learner profiles and teacher
//! profiles.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for account data access
//! - `SqlxUserRepository` implementing the trait for SQLite
//!
//! A user row never exists without its profile row: both are written in one
//! transaction by `create_with_profile`.

use crate::models::{LeaderboardEntry, TeacherProfile, User, UserProfile, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::parse_enum;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user together with its profile (and teacher profile for teachers)
    async fn create_with_profile(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email (case-insensitive)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update names, email, flags
    async fn update(&self, user: &User) -> Result<User>;

    /// Replace the password hash
    async fn set_password(&self, id: i64, password_hash: &str) -> Result<()>;

    /// Stamp last_login with the current time
    async fn touch_last_login(&self, id: i64) -> Result<()>;

    /// Change the role, creating or removing the teacher profile to match
    async fn set_role(&self, id: i64, role: UserRole) -> Result<()>;

    /// Delete a user (cascades to everything they own)
    async fn delete(&self, id: i64) -> Result<()>;

    /// List the users `viewer` may see
    async fn list_visible(&self, viewer: &User, offset: i64, limit: i64) -> Result<(Vec<User>, i64)>;

    /// Whether `viewer` may see `target_id`
    async fn can_view(&self, viewer: &User, target_id: i64) -> Result<bool>;

    /// Active students with public profiles ranked by total points
    async fn student_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>>;

    // Profiles

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>>;

    async fn get_profile_by_id(&self, id: i64) -> Result<Option<UserProfile>>;

    /// Profiles visible to `viewer`: own, public, and (for teachers) their students
    async fn list_profiles(&self, viewer: &User, offset: i64, limit: i64)
        -> Result<(Vec<UserProfile>, i64)>;

    /// Persist the editable profile fields
    async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile>;

    // Teacher profiles

    async fn get_teacher_profile(&self, id: i64) -> Result<Option<TeacherProfile>>;

    async fn list_teacher_profiles(
        &self,
        verified_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<TeacherProfile>, i64)>;

    async fn update_teacher_profile(&self, profile: &TeacherProfile) -> Result<TeacherProfile>;

    /// Whether another teacher already uses this employee id
    async fn employee_id_taken(&self, employee_id: &str, exclude_id: i64) -> Result<bool>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: SqlitePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, role, \
     is_email_verified, is_active, last_login, created_at, updated_at";

const PROFILE_COLUMNS: &str = "id, user_id, bio, date_of_birth, phone, grade_level, school_name, \
     city, country, total_points, level, experience_points, streak_days, longest_streak, \
     last_activity_date, email_notifications, push_notifications, privacy_public_profile, \
     created_at, updated_at";

const TEACHER_COLUMNS: &str = "id, user_id, employee_id, department, subjects, \
     years_of_experience, qualifications, is_verified, verification_date, created_at, updated_at";

/// WHERE clause restricting `column` (a user id) to what the viewer may see.
/// Binds: viewer id, viewer id.
fn user_scope(viewer: &User, column: &str) -> String {
    match viewer.role {
        UserRole::Admin => format!("(? IS NOT NULL OR {c} = ?)", c = column),
        UserRole::Teacher => format!(
            "({c} = ? OR {c} IN (SELECT ce.student_id FROM class_enrollments ce \
             JOIN student_classes sc ON sc.id = ce.class_id WHERE sc.teacher_id = ?))",
            c = column
        ),
        UserRole::Student => format!("({c} = ? AND {c} = ?)", c = column),
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create_with_profile(&self, user: &User) -> Result<User> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, first_name, last_name, password_hash, role,
                               is_email_verified, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.email.to_lowercase())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_email_verified)
        .bind(user.is_active)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create user")?;
        let id = result.last_insert_rowid();

        sqlx::query("INSERT INTO user_profiles (user_id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to create user profile")?;

        if user.role == UserRole::Teacher {
            ensure_teacher_profile(&mut tx, id).await?;
        }

        tx.commit().await.context("Failed to commit user creation")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by ID")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get user by email")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn update(&self, user: &User) -> Result<User> {
        sqlx::query(
            r#"
            UPDATE users
            SET email = ?, first_name = ?, last_name = ?, is_email_verified = ?, is_active = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(user.email.to_lowercase())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_email_verified)
        .bind(user.is_active)
        .bind(Utc::now())
        .bind(user.id)
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;

        self.get_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after update"))
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    async fn touch_last_login(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update last login")?;
        Ok(())
    }

    async fn set_role(&self, id: i64, role: UserRole) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to update role")?;

        if role == UserRole::Teacher {
            ensure_teacher_profile(&mut tx, id).await?;
        } else {
            sqlx::query("DELETE FROM teacher_profiles WHERE user_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to remove teacher profile")?;
        }

        tx.commit().await.context("Failed to commit role change")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete user")?;
        Ok(())
    }

    async fn list_visible(&self, viewer: &User, offset: i64, limit: i64) -> Result<(Vec<User>, i64)> {
        let scope = user_scope(viewer, "u.id");

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM users u WHERE {}", scope))
            .bind(viewer.id)
            .bind(viewer.id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM users u WHERE {} ORDER BY u.id LIMIT ? OFFSET ?",
            prefixed(USER_COLUMNS, "u"),
            scope
        ))
        .bind(viewer.id)
        .bind(viewer.id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;
        Ok((users, total))
    }

    async fn can_view(&self, viewer: &User, target_id: i64) -> Result<bool> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM users u WHERE u.id = ? AND {}",
            user_scope(viewer, "u.id")
        ))
        .bind(target_id)
        .bind(viewer.id)
        .bind(viewer.id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check user visibility")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn student_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.email, p.total_points AS value
            FROM users u
            JOIN user_profiles p ON p.user_id = u.id
            WHERE u.role = 'student' AND u.is_active = 1 AND p.privacy_public_profile = 1
            ORDER BY p.total_points DESC, u.id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load student leaderboard")?;

        Ok(rank_rows(&rows))
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    async fn get_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        get_profile(&mut conn, user_id).await
    }

    async fn get_profile_by_id(&self, id: i64) -> Result<Option<UserProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM user_profiles WHERE id = ?", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get profile by ID")?;

        Ok(row.as_ref().map(row_to_profile))
    }

    async fn list_profiles(
        &self,
        viewer: &User,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<UserProfile>, i64)> {
        let scope = format!(
            "(p.privacy_public_profile = 1 OR {})",
            user_scope(viewer, "p.user_id")
        );

        let count_row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM user_profiles p WHERE {}",
            scope
        ))
        .bind(viewer.id)
        .bind(viewer.id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count profiles")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM user_profiles p WHERE {} ORDER BY p.total_points DESC, p.id ASC LIMIT ? OFFSET ?",
            prefixed(PROFILE_COLUMNS, "p"),
            scope
        ))
        .bind(viewer.id)
        .bind(viewer.id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list profiles")?;

        Ok((rows.iter().map(row_to_profile).collect(), total))
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile> {
        sqlx::query(
            r#"
            UPDATE user_profiles
            SET bio = ?, date_of_birth = ?, phone = ?, grade_level = ?, school_name = ?,
                city = ?, country = ?, email_notifications = ?, push_notifications = ?,
                privacy_public_profile = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&profile.bio)
        .bind(profile.date_of_birth)
        .bind(&profile.phone)
        .bind(profile.grade_level)
        .bind(&profile.school_name)
        .bind(&profile.city)
        .bind(&profile.country)
        .bind(profile.email_notifications)
        .bind(profile.push_notifications)
        .bind(profile.privacy_public_profile)
        .bind(Utc::now())
        .bind(profile.id)
        .execute(&self.pool)
        .await
        .context("Failed to update profile")?;

        self.get_profile_by_id(profile.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Profile not found after update"))
    }

    // ========================================================================
    // Teacher profiles
    // ========================================================================

    async fn get_teacher_profile(&self, id: i64) -> Result<Option<TeacherProfile>> {
        let row = sqlx::query(&format!("SELECT {} FROM teacher_profiles WHERE id = ?", TEACHER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get teacher profile")?;

        Ok(row.as_ref().map(row_to_teacher_profile))
    }

    async fn list_teacher_profiles(
        &self,
        verified_only: bool,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<TeacherProfile>, i64)> {
        let filter = if verified_only { "WHERE is_verified = 1" } else { "" };

        let count_row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM teacher_profiles {}", filter))
            .fetch_one(&self.pool)
            .await
            .context("Failed to count teacher profiles")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "SELECT {} FROM teacher_profiles {} ORDER BY id LIMIT ? OFFSET ?",
            TEACHER_COLUMNS, filter
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list teacher profiles")?;

        Ok((rows.iter().map(row_to_teacher_profile).collect(), total))
    }

    async fn update_teacher_profile(&self, profile: &TeacherProfile) -> Result<TeacherProfile> {
        let subjects = serde_json::to_string(&profile.subjects).context("Failed to encode subjects")?;

        sqlx::query(
            r#"
            UPDATE teacher_profiles
            SET employee_id = ?, department = ?, subjects = ?, years_of_experience = ?,
                qualifications = ?, is_verified = ?, verification_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&profile.employee_id)
        .bind(&profile.department)
        .bind(subjects)
        .bind(profile.years_of_experience)
        .bind(&profile.qualifications)
        .bind(profile.is_verified)
        .bind(profile.verification_date)
        .bind(Utc::now())
        .bind(profile.id)
        .execute(&self.pool)
        .await
        .context("Failed to update teacher profile")?;

        self.get_teacher_profile(profile.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Teacher profile not found after update"))
    }

    async fn employee_id_taken(&self, employee_id: &str, exclude_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM teacher_profiles WHERE employee_id = ? AND id != ?",
        )
        .bind(employee_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check employee id")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }
}

// ============================================================================
// Connection-level helpers
// ============================================================================

async fn ensure_teacher_profile(conn: &mut SqliteConnection, user_id: i64) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT OR IGNORE INTO teacher_profiles (user_id, created_at, updated_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Failed to create teacher profile")?;
    Ok(())
}

/// Load a profile on an existing connection (or open transaction)
pub async fn get_profile(conn: &mut SqliteConnection, user_id: i64) -> Result<Option<UserProfile>> {
    let row = sqlx::query(&format!("SELECT {} FROM user_profiles WHERE user_id = ?", PROFILE_COLUMNS))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to get profile")?;

    Ok(row.as_ref().map(row_to_profile))
}

// ============================================================================
// Row mapping
// ============================================================================

/// Prefix every column in a comma-separated list with a table alias
fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Display name used on leaderboards: full name, or email when unnamed
pub(crate) fn display_name(row: &SqliteRow) -> String {
    let first: String = row.get("first_name");
    let last: String = row.get("last_name");
    let name = format!("{} {}", first, last).trim().to_string();
    if name.is_empty() {
        row.get("email")
    } else {
        name
    }
}

/// Turn ordered `(id, first_name, last_name, email, value)` rows into ranked entries
pub(crate) fn rank_rows(rows: &[SqliteRow]) -> Vec<LeaderboardEntry> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| LeaderboardEntry {
            rank: i as i64 + 1,
            user_id: row.get("id"),
            name: display_name(row),
            value: row.get("value"),
        })
        .collect()
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        role: parse_enum(row, "role")?,
        is_email_verified: row.get("is_email_verified"),
        is_active: row.get("is_active"),
        last_login: row.get("last_login"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_profile(row: &SqliteRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        bio: row.get("bio"),
        date_of_birth: row.get("date_of_birth"),
        phone: row.get("phone"),
        grade_level: row.get("grade_level"),
        school_name: row.get("school_name"),
        city: row.get("city"),
        country: row.get("country"),
        total_points: row.get("total_points"),
        level: row.get("level"),
        experience_points: row.get("experience_points"),
        streak_days: row.get("streak_days"),
        longest_streak: row.get("longest_streak"),
        last_activity_date: row.get("last_activity_date"),
        email_notifications: row.get("email_notifications"),
        push_notifications: row.get("push_notifications"),
        privacy_public_profile: row.get("privacy_public_profile"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_teacher_profile(row: &SqliteRow) -> TeacherProfile {
    let subjects: String = row.get("subjects");
    TeacherProfile {
        id: row.get("id"),
        user_id: row.get("user_id"),
        employee_id: row.get("employee_id"),
        department: row.get("department"),
        subjects: serde_json::from_str(&subjects).unwrap_or_default(),
        years_of_experience: row.get("years_of_experience"),
        qualifications: row.get("qualifications"),
        is_verified: row.get("is_verified"),
        verification_date: row.get("verification_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
