//! Class service
//!
//! Teachers run classes; students join them with an 8-character code.

use crate::db::repositories::ClassRepository;
use crate::models::{ClassInput, ListParams, PagedResult, StudentClass, UpdateClassInput, User};
use anyhow::{Context, Result};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::Utc;
use std::sync::Arc;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 8;
const CODE_ATTEMPTS: usize = 20;

service_error!(
    /// Error types for class operations
    ClassServiceError
);

/// Random join code of `CODE_LENGTH` characters from A-Z0-9
pub fn generate_class_code() -> String {
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = (OsRng.next_u32() as usize) % CODE_ALPHABET.len();
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

pub struct ClassService {
    repo: Arc<dyn ClassRepository>,
}

impl ClassService {
    pub fn new(repo: Arc<dyn ClassRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, viewer: &User, params: &ListParams) -> Result<PagedResult<StudentClass>, ClassServiceError> {
        let (items, total) = self
            .repo
            .list(viewer, params.offset(), params.limit())
            .await
            .context("Failed to list classes")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Visible to the owning teacher, enrolled students and admins
    pub async fn get(&self, viewer: &User, id: i64) -> Result<StudentClass, ClassServiceError> {
        let class = self.load(id).await?;
        if viewer.can_modify(class.teacher_id)
            || self
                .repo
                .is_enrolled(id, viewer.id)
                .await
                .context("Failed to check enrollment")?
        {
            Ok(class)
        } else {
            Err(ClassServiceError::not_found("Class", id))
        }
    }

    pub async fn create(&self, teacher: &User, input: ClassInput) -> Result<StudentClass, ClassServiceError> {
        super::require_staff(teacher).map_err(ClassServiceError::Forbidden)?;
        let name = validate_name(&input.name)?;

        let now = Utc::now();
        let class = StudentClass {
            id: 0,
            name,
            description: input.description,
            teacher_id: teacher.id,
            class_code: self.unused_code().await?,
            is_active: true,
            student_count: 0,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&class).await.context("Failed to create class")?;
        tracing::info!("Teacher {} created class {} ({})", teacher.id, created.id, created.class_code);
        Ok(created)
    }

    pub async fn update(
        &self,
        viewer: &User,
        id: i64,
        input: UpdateClassInput,
    ) -> Result<StudentClass, ClassServiceError> {
        let mut class = self.owned(viewer, id).await?;

        if let Some(name) = input.name {
            class.name = validate_name(&name)?;
        }
        if let Some(description) = input.description {
            class.description = description;
        }
        if let Some(is_active) = input.is_active {
            class.is_active = is_active;
        }

        Ok(self.repo.update(&class).await.context("Failed to update class")?)
    }

    pub async fn delete(&self, viewer: &User, id: i64) -> Result<(), ClassServiceError> {
        self.owned(viewer, id).await?;
        self.repo.delete(id).await.context("Failed to delete class")?;
        Ok(())
    }

    /// Join an active class by code. Students only.
    pub async fn enroll(&self, student: &User, code: &str) -> Result<StudentClass, ClassServiceError> {
        if !student.is_student() {
            return Err(ClassServiceError::forbidden("Only students can join classes"));
        }

        let code = code.trim().to_uppercase();
        let class = self
            .repo
            .get_by_code(&code)
            .await
            .context("Failed to look up class code")?
            .filter(|c| c.is_active)
            .ok_or_else(|| ClassServiceError::validation("Invalid or inactive class code"))?;

        if self
            .repo
            .is_enrolled(class.id, student.id)
            .await
            .context("Failed to check enrollment")?
        {
            return Err(ClassServiceError::validation("You are already enrolled in this class"));
        }

        self.repo.enroll(class.id, student.id).await.context("Failed to enroll")?;
        tracing::debug!("Student {} joined class {}", student.id, class.id);
        self.load(class.id).await
    }

    pub async fn leave(&self, student: &User, id: i64) -> Result<(), ClassServiceError> {
        self.load(id).await?;
        if !self
            .repo
            .is_enrolled(id, student.id)
            .await
            .context("Failed to check enrollment")?
        {
            return Err(ClassServiceError::validation("You are not enrolled in this class"));
        }
        self.repo.unenroll(id, student.id).await.context("Failed to leave class")?;
        Ok(())
    }

    /// Roster for the owning teacher or an admin
    pub async fn students(&self, viewer: &User, id: i64) -> Result<Vec<User>, ClassServiceError> {
        self.owned(viewer, id).await?;
        Ok(self.repo.students(id).await.context("Failed to list students")?)
    }

    async fn load(&self, id: i64) -> Result<StudentClass, ClassServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get class")?
            .ok_or_else(|| ClassServiceError::not_found("Class", id))
    }

    async fn owned(&self, viewer: &User, id: i64) -> Result<StudentClass, ClassServiceError> {
        let class = self.get(viewer, id).await?;
        if !viewer.can_modify(class.teacher_id) {
            return Err(ClassServiceError::forbidden(
                "Only the class teacher or an admin can do this",
            ));
        }
        Ok(class)
    }

    async fn unused_code(&self) -> Result<String> {
        for _ in 0..CODE_ATTEMPTS {
            let code = generate_class_code();
            if !self.repo.code_exists(&code).await? {
                return Ok(code);
            }
        }
        anyhow::bail!("Could not generate a unique class code")
    }
}

fn validate_name(name: &str) -> Result<String, ClassServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClassServiceError::validation("Class name is required"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{test_support, SqlxClassRepository};
    use crate::models::UserRole;

    fn input(name: &str) -> ClassInput {
        ClassInput {
            name: name.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_generate_class_code() {
        for _ in 0..50 {
            let code = generate_class_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_class_lifecycle() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let service = ClassService::new(SqlxClassRepository::boxed(pool.clone()));

        assert!(matches!(
            service.create(&student, input("Nope")).await,
            Err(ClassServiceError::Forbidden(_))
        ));
        let class = service.create(&teacher, input("Climate 101")).await.unwrap();

        // a student outside the class cannot see it
        assert!(service.get(&student, class.id).await.is_err());

        let joined = service
            .enroll(&student, &class.class_code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(joined.student_count, 1);
        assert!(matches!(
            service.enroll(&student, &class.class_code).await,
            Err(ClassServiceError::ValidationError(_))
        ));
        assert!(service.get(&student, class.id).await.is_ok());

        let roster = service.students(&teacher, class.id).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert!(matches!(
            service.students(&student, class.id).await,
            Err(ClassServiceError::Forbidden(_))
        ));

        service.leave(&student, class.id).await.unwrap();
        assert!(service.leave(&student, class.id).await.is_err());
    }

    #[tokio::test]
    async fn test_inactive_class_rejects_enrollment() {
        let pool = test_support::pool().await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;
        let service = ClassService::new(SqlxClassRepository::boxed(pool.clone()));

        let class = service.create(&teacher, input("Oceans")).await.unwrap();
        service
            .update(
                &teacher,
                class.id,
                UpdateClassInput {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            service.enroll(&student, &class.class_code).await,
            Err(ClassServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.enroll(&teacher, &class.class_code).await,
            Err(ClassServiceError::Forbidden(_))
        ));
    }
}
