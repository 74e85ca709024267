//! Class repository
//!
//! Database operations for student classes and their enrollments.

use crate::models::{StudentClass, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Class repository trait
#[async_trait]
pub trait ClassRepository: Send + Sync {
    /// Create a new class (the code must already be generated)
    async fn create(&self, class: &StudentClass) -> Result<StudentClass>;

    /// Get class by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<StudentClass>>;

    /// Get class by its join code (exact match)
    async fn get_by_code(&self, code: &str) -> Result<Option<StudentClass>>;

    /// Update name, description, is_active
    async fn update(&self, class: &StudentClass) -> Result<StudentClass>;

    /// Delete a class
    async fn delete(&self, id: i64) -> Result<()>;

    /// Classes visible to `viewer`: all for admins, own for teachers, enrolled for students
    async fn list(&self, viewer: &User, offset: i64, limit: i64) -> Result<(Vec<StudentClass>, i64)>;

    /// Whether a join code is already in use
    async fn code_exists(&self, code: &str) -> Result<bool>;

    async fn enroll(&self, class_id: i64, student_id: i64) -> Result<()>;

    async fn unenroll(&self, class_id: i64, student_id: i64) -> Result<()>;

    async fn is_enrolled(&self, class_id: i64, student_id: i64) -> Result<bool>;

    /// Students enrolled in a class, ordered by name
    async fn students(&self, class_id: i64) -> Result<Vec<User>>;

    /// IDs of the classes a student is enrolled in
    async fn class_ids_for_student(&self, student_id: i64) -> Result<Vec<i64>>;
}

/// SQLx-based class repository implementation
pub struct SqlxClassRepository {
    pool: SqlitePool,
}

impl SqlxClassRepository {
    /// Create a new SQLx class repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn ClassRepository> {
        Arc::new(Self::new(pool))
    }
}

const CLASS_SELECT: &str = r#"
    SELECT c.id, c.name, c.description, c.teacher_id, c.class_code, c.is_active,
           c.created_at, c.updated_at,
           (SELECT COUNT(*) FROM class_enrollments e WHERE e.class_id = c.id) AS student_count
    FROM student_classes c
"#;

#[async_trait]
impl ClassRepository for SqlxClassRepository {
    async fn create(&self, class: &StudentClass) -> Result<StudentClass> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO student_classes (name, description, teacher_id, class_code, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&class.name)
        .bind(&class.description)
        .bind(class.teacher_id)
        .bind(&class.class_code)
        .bind(class.is_active)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create class")?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Class not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<StudentClass>> {
        let row = sqlx::query(&format!("{} WHERE c.id = ?", CLASS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get class by ID")?;

        Ok(row.as_ref().map(row_to_class))
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<StudentClass>> {
        let row = sqlx::query(&format!("{} WHERE c.class_code = ?", CLASS_SELECT))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get class by code")?;

        Ok(row.as_ref().map(row_to_class))
    }

    async fn update(&self, class: &StudentClass) -> Result<StudentClass> {
        sqlx::query(
            "UPDATE student_classes SET name = ?, description = ?, is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&class.name)
        .bind(&class.description)
        .bind(class.is_active)
        .bind(Utc::now())
        .bind(class.id)
        .execute(&self.pool)
        .await
        .context("Failed to update class")?;

        self.get_by_id(class.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Class not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM student_classes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete class")?;
        Ok(())
    }

    async fn list(&self, viewer: &User, offset: i64, limit: i64) -> Result<(Vec<StudentClass>, i64)> {
        let scope = match viewer.role {
            UserRole::Admin => "? IS NOT NULL",
            UserRole::Teacher => "c.teacher_id = ?",
            UserRole::Student => {
                "c.id IN (SELECT class_id FROM class_enrollments WHERE student_id = ?)"
            }
        };

        let count_row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM student_classes c WHERE {}",
            scope
        ))
        .bind(viewer.id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count classes")?;
        let total: i64 = count_row.get("count");

        let rows = sqlx::query(&format!(
            "{} WHERE {} ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
            CLASS_SELECT, scope
        ))
        .bind(viewer.id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list classes")?;

        Ok((rows.iter().map(row_to_class).collect(), total))
    }

    async fn code_exists(&self, code: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM student_classes WHERE class_code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check class code")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn enroll(&self, class_id: i64, student_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO class_enrollments (class_id, student_id, enrolled_at) VALUES (?, ?, ?)",
        )
        .bind(class_id)
        .bind(student_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to enroll student")?;
        Ok(())
    }

    async fn unenroll(&self, class_id: i64, student_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM class_enrollments WHERE class_id = ? AND student_id = ?")
            .bind(class_id)
            .bind(student_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove enrollment")?;
        Ok(())
    }

    async fn is_enrolled(&self, class_id: i64, student_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM class_enrollments WHERE class_id = ? AND student_id = ?",
        )
        .bind(class_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check enrollment")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    async fn students(&self, class_id: i64) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.email, u.first_name, u.last_name, u.role, u.is_email_verified,
                   u.is_active, u.last_login, u.created_at, u.updated_at
            FROM users u
            JOIN class_enrollments e ON e.student_id = u.id
            WHERE e.class_id = ?
            ORDER BY u.last_name, u.first_name, u.id
            "#,
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list class students")?;

        rows.iter()
            .map(|row| {
                Ok(User {
                    id: row.get("id"),
                    email: row.get("email"),
                    first_name: row.get("first_name"),
                    last_name: row.get("last_name"),
                    password_hash: String::new(),
                    role: super::parse_enum(row, "role")?,
                    is_email_verified: row.get("is_email_verified"),
                    is_active: row.get("is_active"),
                    last_login: row.get("last_login"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }

    async fn class_ids_for_student(&self, student_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT class_id FROM class_enrollments WHERE student_id = ? ORDER BY class_id")
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list student classes")?;

        Ok(rows.iter().map(|row| row.get("class_id")).collect())
    }
}

fn row_to_class(row: &SqliteRow) -> StudentClass {
    StudentClass {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        teacher_id: row.get("teacher_id"),
        class_code: row.get("class_code"),
        is_active: row.get("is_active"),
        student_count: row.get("student_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::test_support;

    pub(crate) fn new_class(teacher_id: i64, code: &str) -> StudentClass {
        let now = Utc::now();
        StudentClass {
            id: 0,
            name: "Climate 101".to_string(),
            description: String::new(),
            teacher_id,
            class_code: code.to_string(),
            is_active: true,
            student_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_enrollment_lifecycle() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let repo = SqlxClassRepository::new(pool);

        let class = repo.create(&new_class(teacher.id, "ABCD1234")).await.unwrap();
        assert!(repo.code_exists("ABCD1234").await.unwrap());
        assert_eq!(repo.get_by_code("ABCD1234").await.unwrap().map(|c| c.id), Some(class.id));

        repo.enroll(class.id, student.id).await.unwrap();
        repo.enroll(class.id, student.id).await.unwrap();
        assert!(repo.is_enrolled(class.id, student.id).await.unwrap());
        assert_eq!(repo.get_by_id(class.id).await.unwrap().unwrap().student_count, 1);
        assert_eq!(repo.students(class.id).await.unwrap().len(), 1);
        assert_eq!(repo.class_ids_for_student(student.id).await.unwrap(), vec![class.id]);

        let (classes, total) = repo.list(&student, 0, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(classes[0].id, class.id);

        repo.unenroll(class.id, student.id).await.unwrap();
        assert!(!repo.is_enrolled(class.id, student.id).await.unwrap());
        let (_, total) = repo.list(&student, 0, 20).await.unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_list_scoped_to_teacher() {
        let pool = test_support::pool().await;
        let admin = test_support::user(&pool, "a@example.com", UserRole::Admin).await;
        let t1 = test_support::user(&pool, "t1@example.com", UserRole::Teacher).await;
        let t2 = test_support::user(&pool, "t2@example.com", UserRole::Teacher).await;
        let repo = SqlxClassRepository::new(pool);

        repo.create(&new_class(t1.id, "AAAA0001")).await.unwrap();
        repo.create(&new_class(t2.id, "AAAA0002")).await.unwrap();

        assert_eq!(repo.list(&t1, 0, 20).await.unwrap().1, 1);
        assert_eq!(repo.list(&admin, 0, 20).await.unwrap().1, 2);
    }
}
