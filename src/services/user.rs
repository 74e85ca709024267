//! User service
//!
//! Accounts, authentication and the per-user profile records:
//! - Registration with role choice (admin is never self-assigned)
//! - Login issuing JWT access/refresh pairs, refresh, bearer authentication
//! - Role-scoped listing of users and profiles
//! - Teacher profiles and their verification
//! - Streak updates and the cached student leaderboard

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::UserRepository;
use crate::models::{
    LeaderboardEntry, ListParams, PagedResult, TeacherProfile, UpdateProfileInput,
    UpdateTeacherProfileInput, User, UserProfile, UserRole,
};
use crate::services::gamification::{invalidate_rankings, streak_updated, StreakUpdate};
use crate::services::password::{hash_password, validate_new_password, verify_password};
use crate::services::token::{TokenPair, TokenService, TokenType};
use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?1?\d{9,15}$").expect("valid phone regex"));

const MAX_BIO_LENGTH: usize = 500;
const LEADERBOARD_SIZE: i64 = 50;
const LEADERBOARD_TTL: Duration = Duration::from_secs(300);

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Bad credentials, inactive account or invalid token
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Email or employee id already in use
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl UserServiceError {
    fn not_found(what: &str, id: i64) -> Self {
        Self::NotFound(format!("{} not found: {}", what, id))
    }
}

/// Input for self-registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: Option<UserRole>,
}

/// Successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

/// Fresh access token from a refresh token
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub access: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Account fields editable through `update_me` and `update_user`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Admin only
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

/// Response of an explicit streak update
#[derive(Debug, Clone, Serialize)]
pub struct StreakResponse {
    pub detail: String,
    #[serde(flatten)]
    pub streak: StreakUpdate,
}

/// User service for accounts, authentication and profiles
pub struct UserService {
    pool: SqlitePool,
    user_repo: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    cache: Arc<Cache>,
}

impl UserService {
    pub fn new(
        pool: SqlitePool,
        user_repo: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            pool,
            user_repo,
            tokens,
            cache,
        }
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Register a new account.
    ///
    /// The role defaults to student. Teachers get their teacher profile in
    /// the same transaction as the user and profile rows.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let email = input.email.trim().to_lowercase();
        validate_email(&email)?;
        validate_new_password(&input.password, &input.password_confirm)
            .map_err(UserServiceError::ValidationError)?;

        let role = input.role.unwrap_or_default();
        if role == UserRole::Admin {
            return Err(UserServiceError::ValidationError(
                "The admin role cannot be self-assigned".to_string(),
            ));
        }

        self.ensure_email_free(&email, 0).await?;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(
            email,
            input.first_name.trim().to_string(),
            input.last_name.trim().to_string(),
            password_hash,
            role,
        );
        let created = self
            .user_repo
            .create_with_profile(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!("Registered user {} ({})", created.id, created.role);
        Ok(created)
    }

    /// Check credentials and issue a token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let user = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to look up user")?
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash).context("Failed to verify password")? {
            return Err(invalid());
        }
        if !user.is_active {
            return Err(UserServiceError::AuthenticationError(
                "Account is disabled".to_string(),
            ));
        }

        self.user_repo
            .touch_last_login(user.id)
            .await
            .context("Failed to update last login")?;

        let tokens = self.tokens.token_pair(&user)?;
        let user = self
            .user_repo
            .get_by_id(user.id)
            .await
            .context("Failed to reload user")?
            .unwrap_or(user);

        tracing::debug!("User {} logged in", user.id);
        Ok(LoginResponse { tokens, user })
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, UserServiceError> {
        let user = self.user_for_token(refresh_token, TokenType::Refresh).await?;
        Ok(RefreshResponse {
            access: self.tokens.access_token(&user)?,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_lifetime_secs(),
        })
    }

    /// Resolve a bearer access token to an active user
    pub async fn authenticate(&self, access_token: &str) -> Result<User, UserServiceError> {
        self.user_for_token(access_token, TokenType::Access).await
    }

    async fn user_for_token(&self, token: &str, expected: TokenType) -> Result<User, UserServiceError> {
        let claims = self
            .tokens
            .verify(token, expected)
            .map_err(|e| UserServiceError::AuthenticationError(e.to_string()))?;
        let user_id = claims
            .user_id()
            .map_err(|e| UserServiceError::AuthenticationError(e.to_string()))?;

        match self.user_repo.get_by_id(user_id).await.context("Failed to load user")? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(UserServiceError::AuthenticationError(
                "Account is disabled".to_string(),
            )),
            None => Err(UserServiceError::AuthenticationError(
                "User no longer exists".to_string(),
            )),
        }
    }

    pub async fn change_password(
        &self,
        user: &User,
        input: ChangePasswordInput,
    ) -> Result<(), UserServiceError> {
        if !verify_password(&input.old_password, &user.password_hash)
            .context("Failed to verify password")?
        {
            return Err(UserServiceError::ValidationError(
                "Old password is incorrect".to_string(),
            ));
        }
        validate_new_password(&input.new_password, &input.new_password_confirm)
            .map_err(UserServiceError::ValidationError)?;

        let hash = hash_password(&input.new_password).context("Failed to hash password")?;
        self.user_repo
            .set_password(user.id, &hash)
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Names only; email and activation go through `update_user`
    pub async fn update_me(&self, user: &User, input: UpdateUserInput) -> Result<User, UserServiceError> {
        let mut updated = user.clone();
        if let Some(first_name) = input.first_name {
            updated.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = input.last_name {
            updated.last_name = last_name.trim().to_string();
        }
        Ok(self.user_repo.update(&updated).await.context("Failed to update user")?)
    }

    pub async fn list_users(
        &self,
        viewer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<User>, UserServiceError> {
        let (items, total) = self
            .user_repo
            .list_visible(viewer, params.offset(), params.limit())
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_user(&self, viewer: &User, id: i64) -> Result<User, UserServiceError> {
        if !self.user_repo.can_view(viewer, id).await.context("Failed to check visibility")? {
            return Err(UserServiceError::not_found("User", id));
        }
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::not_found("User", id))
    }

    /// Self or admin. Only admins may change `is_active`.
    pub async fn update_user(
        &self,
        viewer: &User,
        id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get_user(viewer, id).await?;
        if !viewer.can_modify(user.id) {
            return Err(UserServiceError::Forbidden(
                "You can only edit your own account".to_string(),
            ));
        }

        if let Some(first_name) = input.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = input.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(email) = input.email {
            let email = email.trim().to_lowercase();
            if email != user.email {
                validate_email(&email)?;
                self.ensure_email_free(&email, user.id).await?;
                user.email = email;
                user.is_email_verified = false;
            }
        }
        if let Some(is_active) = input.is_active {
            if !viewer.is_admin() {
                return Err(UserServiceError::Forbidden(
                    "Only admins can activate or deactivate accounts".to_string(),
                ));
            }
            user.is_active = is_active;
        }

        Ok(self.user_repo.update(&user).await.context("Failed to update user")?)
    }

    pub async fn delete_user(&self, admin: &User, id: i64) -> Result<(), UserServiceError> {
        super::require_admin(admin).map_err(UserServiceError::Forbidden)?;
        if admin.id == id {
            return Err(UserServiceError::ValidationError(
                "You cannot delete your own account".to_string(),
            ));
        }
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::not_found("User", id))?;

        self.user_repo.delete(id).await.context("Failed to delete user")?;
        if let Err(e) = self.cache.delete_pattern(keys::LEADERBOARD_PATTERN).await {
            tracing::warn!("Failed to evict cache: {:#}", e);
        }
        tracing::info!("User {} deleted by admin {}", id, admin.id);
        Ok(())
    }

    /// Change a role; the teacher profile follows the role
    pub async fn set_role(&self, admin: &User, id: i64, role: UserRole) -> Result<User, UserServiceError> {
        super::require_admin(admin).map_err(UserServiceError::Forbidden)?;
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::not_found("User", id))?;

        self.user_repo.set_role(id, role).await.context("Failed to set role")?;
        if let Err(e) = self.cache.delete_pattern(keys::LEADERBOARD_PATTERN).await {
            tracing::warn!("Failed to evict cache: {:#}", e);
        }

        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to reload user")?
            .ok_or_else(|| UserServiceError::not_found("User", id))
    }

    /// Top students by total points, cached
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, UserServiceError> {
        if let Some(cached) = self
            .cache
            .get::<Vec<LeaderboardEntry>>(keys::GLOBAL_LEADERBOARD)
            .await
            .ok()
            .flatten()
        {
            return Ok(cached);
        }

        let entries = self
            .user_repo
            .student_leaderboard(LEADERBOARD_SIZE)
            .await
            .context("Failed to load leaderboard")?;
        if let Err(e) = self
            .cache
            .set(keys::GLOBAL_LEADERBOARD, &entries, LEADERBOARD_TTL)
            .await
        {
            tracing::warn!("Failed to write cache: {:#}", e);
        }
        Ok(entries)
    }

    async fn ensure_email_free(&self, email: &str, exclude_id: i64) -> Result<(), UserServiceError> {
        match self.user_repo.get_by_email(email).await.context("Failed to check email")? {
            Some(existing) if existing.id != exclude_id => Err(UserServiceError::Conflict(format!(
                "Email '{}' is already registered",
                email
            ))),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    pub async fn own_profile(&self, user: &User) -> Result<UserProfile, UserServiceError> {
        self.user_repo
            .get_profile(user.id)
            .await
            .context("Failed to get profile")?
            .ok_or_else(|| UserServiceError::NotFound("Profile not found".to_string()))
    }

    pub async fn list_profiles(
        &self,
        viewer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<UserProfile>, UserServiceError> {
        let (items, total) = self
            .user_repo
            .list_profiles(viewer, params.offset(), params.limit())
            .await
            .context("Failed to list profiles")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Own, public, or within the viewer's user scope
    pub async fn get_profile(&self, viewer: &User, id: i64) -> Result<UserProfile, UserServiceError> {
        let profile = self
            .user_repo
            .get_profile_by_id(id)
            .await
            .context("Failed to get profile")?
            .ok_or_else(|| UserServiceError::not_found("Profile", id))?;

        if profile.privacy_public_profile
            || self
                .user_repo
                .can_view(viewer, profile.user_id)
                .await
                .context("Failed to check visibility")?
        {
            Ok(profile)
        } else {
            Err(UserServiceError::not_found("Profile", id))
        }
    }

    pub async fn update_profile(
        &self,
        viewer: &User,
        id: i64,
        input: UpdateProfileInput,
    ) -> Result<UserProfile, UserServiceError> {
        let mut profile = self.get_profile(viewer, id).await?;
        if !viewer.can_modify(profile.user_id) {
            return Err(UserServiceError::Forbidden(
                "You can only edit your own profile".to_string(),
            ));
        }

        if let Some(bio) = input.bio {
            if bio.chars().count() > MAX_BIO_LENGTH {
                return Err(UserServiceError::ValidationError(format!(
                    "Bio must be at most {} characters",
                    MAX_BIO_LENGTH
                )));
            }
            profile.bio = bio;
        }
        if let Some(phone) = input.phone {
            let phone = phone.trim().to_string();
            if !phone.is_empty() && !PHONE_RE.is_match(&phone) {
                return Err(UserServiceError::ValidationError(
                    "Phone number must be entered in the format '+999999999' (9 to 15 digits)"
                        .to_string(),
                ));
            }
            profile.phone = phone;
        }
        if let Some(grade) = input.grade_level {
            if !(6..=12).contains(&grade) {
                return Err(UserServiceError::ValidationError(
                    "Grade level must be between 6 and 12".to_string(),
                ));
            }
            profile.grade_level = Some(grade);
        }
        if input.date_of_birth.is_some() {
            profile.date_of_birth = input.date_of_birth;
        }
        if let Some(school_name) = input.school_name {
            profile.school_name = school_name;
        }
        if let Some(city) = input.city {
            profile.city = city;
        }
        if let Some(country) = input.country {
            profile.country = country;
        }
        if let Some(v) = input.email_notifications {
            profile.email_notifications = v;
        }
        if let Some(v) = input.push_notifications {
            profile.push_notifications = v;
        }
        if let Some(v) = input.privacy_public_profile {
            profile.privacy_public_profile = v;
            if let Err(e) = self.cache.delete_pattern(keys::LEADERBOARD_PATTERN).await {
                tracing::warn!("Failed to evict cache: {:#}", e);
            }
        }

        Ok(self
            .user_repo
            .update_profile(&profile)
            .await
            .context("Failed to update profile")?)
    }

    /// Advance the owner's streak for today
    pub async fn update_streak(&self, viewer: &User, profile_id: i64) -> Result<StreakResponse, UserServiceError> {
        let profile = self.get_profile(viewer, profile_id).await?;
        if profile.user_id != viewer.id {
            return Err(UserServiceError::Forbidden(
                "You can only update your own streak".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let (streak, outcome) = streak_updated(&mut *tx, viewer.id, Utc::now().date_naive()).await?;
        tx.commit().await.context("Failed to commit transaction")?;
        invalidate_rankings(&self.cache, &outcome).await;

        let detail = if streak.updated {
            "Streak updated"
        } else {
            "Streak already updated today"
        };
        Ok(StreakResponse {
            detail: detail.to_string(),
            streak,
        })
    }

    // ========================================================================
    // Teacher profiles
    // ========================================================================

    /// Students see verified teachers only
    pub async fn list_teacher_profiles(
        &self,
        viewer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<TeacherProfile>, UserServiceError> {
        let (items, total) = self
            .user_repo
            .list_teacher_profiles(viewer.is_student(), params.offset(), params.limit())
            .await
            .context("Failed to list teacher profiles")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_teacher_profile(&self, viewer: &User, id: i64) -> Result<TeacherProfile, UserServiceError> {
        self.user_repo
            .get_teacher_profile(id)
            .await
            .context("Failed to get teacher profile")?
            .filter(|p| !viewer.is_student() || p.is_verified)
            .ok_or_else(|| UserServiceError::not_found("Teacher profile", id))
    }

    pub async fn update_teacher_profile(
        &self,
        viewer: &User,
        id: i64,
        input: UpdateTeacherProfileInput,
    ) -> Result<TeacherProfile, UserServiceError> {
        let mut profile = self.get_teacher_profile(viewer, id).await?;
        if !viewer.can_modify(profile.user_id) {
            return Err(UserServiceError::Forbidden(
                "You can only edit your own teacher profile".to_string(),
            ));
        }

        if let Some(employee_id) = input.employee_id {
            let employee_id = employee_id.trim().to_string();
            if employee_id.is_empty() {
                profile.employee_id = None;
            } else {
                if self
                    .user_repo
                    .employee_id_taken(&employee_id, profile.id)
                    .await
                    .context("Failed to check employee id")?
                {
                    return Err(UserServiceError::Conflict(format!(
                        "Employee id '{}' is already in use",
                        employee_id
                    )));
                }
                profile.employee_id = Some(employee_id);
            }
        }
        if let Some(department) = input.department {
            profile.department = department;
        }
        if let Some(subjects) = input.subjects {
            profile.subjects = subjects;
        }
        if let Some(years) = input.years_of_experience {
            if years < 0 {
                return Err(UserServiceError::ValidationError(
                    "Years of experience cannot be negative".to_string(),
                ));
            }
            profile.years_of_experience = years;
        }
        if let Some(qualifications) = input.qualifications {
            profile.qualifications = qualifications;
        }
        if let Some(verified) = input.is_verified {
            if !viewer.is_admin() {
                return Err(UserServiceError::Forbidden(
                    "Only admins can verify teachers".to_string(),
                ));
            }
            if verified != profile.is_verified {
                profile.is_verified = verified;
                profile.verification_date = verified.then(Utc::now);
            }
        }

        Ok(self
            .user_repo
            .update_teacher_profile(&profile)
            .await
            .context("Failed to update teacher profile")?)
    }
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(UserServiceError::ValidationError(
            "Enter a valid email address".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::{AuthConfig, CacheConfig};
    use crate::db::repositories::{test_support, SqlxUserRepository};

    async fn setup_test_service() -> (SqlitePool, UserService) {
        let pool = test_support::pool().await;
        let service = UserService::new(
            pool.clone(),
            SqlxUserRepository::boxed(pool.clone()),
            Arc::new(TokenService::new(&AuthConfig::default())),
            create_cache(&CacheConfig::default()),
        );
        (pool, service)
    }

    fn register_input(email: &str, role: Option<UserRole>) -> RegisterInput {
        RegisterInput {
            email: email.to_string(),
            password: "password123".to_string(),
            password_confirm: "password123".to_string(),
            first_name: "Greta".to_string(),
            last_name: "T".to_string(),
            role,
        }
    }

    // ========================================================================
    // Registration and login
    // ========================================================================

    #[tokio::test]
    async fn test_register_defaults_to_student() {
        let (_pool, service) = setup_test_service().await;

        let user = service
            .register(register_input("  Greta@Example.com ", None))
            .await
            .expect("Failed to register");

        assert_eq!(user.role, UserRole::Student);
        assert_eq!(user.email, "greta@example.com");
        assert!(service.own_profile(&user).await.is_ok());
    }

    #[tokio::test]
    async fn test_register_teacher_gets_teacher_profile() {
        let (_pool, service) = setup_test_service().await;
        let teacher = service
            .register(register_input("t@example.com", Some(UserRole::Teacher)))
            .await
            .unwrap();

        let profiles = service
            .list_teacher_profiles(&teacher, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(profiles.total, 1);
        assert_eq!(profiles.items[0].user_id, teacher.id);
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let (_pool, service) = setup_test_service().await;
        service.register(register_input("a@example.com", None)).await.unwrap();

        assert!(matches!(
            service.register(register_input("A@example.com", None)).await,
            Err(UserServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.register(register_input("b@example.com", Some(UserRole::Admin))).await,
            Err(UserServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.register(register_input("not-an-email", None)).await,
            Err(UserServiceError::ValidationError(_))
        ));

        let mut mismatch = register_input("c@example.com", None);
        mismatch.password_confirm = "password124".to_string();
        assert!(matches!(
            service.register(mismatch).await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_login_and_refresh() {
        let (_pool, service) = setup_test_service().await;
        service.register(register_input("a@example.com", None)).await.unwrap();

        let login = service.login("a@example.com", "password123").await.unwrap();
        assert_eq!(login.tokens.token_type, "Bearer");
        assert!(login.user.last_login.is_some());

        let user = service.authenticate(&login.tokens.access).await.unwrap();
        assert_eq!(user.id, login.user.id);

        let refreshed = service.refresh(&login.tokens.refresh).await.unwrap();
        assert!(service.authenticate(&refreshed.access).await.is_ok());

        // token kinds are not interchangeable
        assert!(service.refresh(&login.tokens.access).await.is_err());
        assert!(service.authenticate(&login.tokens.refresh).await.is_err());

        assert!(matches!(
            service.login("a@example.com", "wrong-password").await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login("nobody@example.com", "password123").await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_log_in_or_refresh() {
        let (pool, service) = setup_test_service().await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let user = service.register(register_input("a@example.com", None)).await.unwrap();
        let login = service.login("a@example.com", "password123").await.unwrap();

        service
            .update_user(
                &admin,
                user.id,
                UpdateUserInput {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(service.login("a@example.com", "password123").await.is_err());
        assert!(service.refresh(&login.tokens.refresh).await.is_err());
        assert!(service.authenticate(&login.tokens.access).await.is_err());
    }

    #[tokio::test]
    async fn test_change_password() {
        let (_pool, service) = setup_test_service().await;
        let user = service.register(register_input("a@example.com", None)).await.unwrap();

        let wrong_old = ChangePasswordInput {
            old_password: "nope-nope".to_string(),
            new_password: "newpassword1".to_string(),
            new_password_confirm: "newpassword1".to_string(),
        };
        assert!(service.change_password(&user, wrong_old).await.is_err());

        let input = ChangePasswordInput {
            old_password: "password123".to_string(),
            new_password: "newpassword1".to_string(),
            new_password_confirm: "newpassword1".to_string(),
        };
        service.change_password(&user, input).await.unwrap();

        assert!(service.login("a@example.com", "password123").await.is_err());
        assert!(service.login("a@example.com", "newpassword1").await.is_ok());
    }

    // ========================================================================
    // Scoping and roles
    // ========================================================================

    #[tokio::test]
    async fn test_student_sees_only_self() {
        let (pool, service) = setup_test_service().await;
        let a = test_support::user(&pool, "a@example.com", UserRole::Student).await;
        let b = test_support::user(&pool, "b@example.com", UserRole::Student).await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;

        let page = service.list_users(&a, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(matches!(
            service.get_user(&a, b.id).await,
            Err(UserServiceError::NotFound(_))
        ));
        assert_eq!(service.list_users(&admin, &ListParams::default()).await.unwrap().total, 3);
        assert!(matches!(
            service.delete_user(&a, b.id).await,
            Err(UserServiceError::Forbidden(_))
        ));
        service.delete_user(&admin, b.id).await.unwrap();
        assert!(service.get_user(&admin, b.id).await.is_err());
    }

    #[tokio::test]
    async fn test_set_role_keeps_teacher_profile_in_step() {
        let (pool, service) = setup_test_service().await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let user = test_support::user(&pool, "a@example.com", UserRole::Student).await;

        service.set_role(&admin, user.id, UserRole::Teacher).await.unwrap();
        let profiles = service
            .list_teacher_profiles(&admin, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(profiles.total, 1);

        let changed = service.set_role(&admin, user.id, UserRole::Student).await.unwrap();
        assert_eq!(changed.role, UserRole::Student);
        let profiles = service
            .list_teacher_profiles(&admin, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(profiles.total, 0);
    }

    #[tokio::test]
    async fn test_update_profile_validation() {
        let (pool, service) = setup_test_service().await;
        let user = test_support::user(&pool, "a@example.com", UserRole::Student).await;
        let profile = service.own_profile(&user).await.unwrap();

        let bad_phone = UpdateProfileInput {
            phone: Some("12-34".to_string()),
            ..Default::default()
        };
        assert!(service.update_profile(&user, profile.id, bad_phone).await.is_err());

        let bad_grade = UpdateProfileInput {
            grade_level: Some(13),
            ..Default::default()
        };
        assert!(service.update_profile(&user, profile.id, bad_grade).await.is_err());

        let ok = UpdateProfileInput {
            phone: Some("+14155550100".to_string()),
            grade_level: Some(9),
            city: Some("Oslo".to_string()),
            privacy_public_profile: Some(true),
            ..Default::default()
        };
        let updated = service.update_profile(&user, profile.id, ok).await.unwrap();
        assert_eq!(updated.grade_level, Some(9));
        assert_eq!(updated.city, "Oslo");
        assert!(updated.privacy_public_profile);
    }

    #[tokio::test]
    async fn test_private_profiles_hidden_from_other_students() {
        let (pool, service) = setup_test_service().await;
        let a = test_support::user(&pool, "a@example.com", UserRole::Student).await;
        let b = test_support::user(&pool, "b@example.com", UserRole::Student).await;
        let b_profile = service.own_profile(&b).await.unwrap();

        assert!(service.get_profile(&a, b_profile.id).await.is_err());

        service
            .update_profile(
                &b,
                b_profile.id,
                UpdateProfileInput {
                    privacy_public_profile: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(service.get_profile(&a, b_profile.id).await.is_ok());
        assert!(matches!(
            service
                .update_profile(&a, b_profile.id, UpdateProfileInput::default())
                .await,
            Err(UserServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_update_streak_once_per_day() {
        let (pool, service) = setup_test_service().await;
        let user = test_support::user(&pool, "a@example.com", UserRole::Student).await;
        let profile = service.own_profile(&user).await.unwrap();

        let first = service.update_streak(&user, profile.id).await.unwrap();
        assert!(first.streak.updated);
        assert_eq!(first.streak.streak_days, 1);

        let second = service.update_streak(&user, profile.id).await.unwrap();
        assert!(!second.streak.updated);
        assert_eq!(second.detail, "Streak already updated today");
    }

    #[tokio::test]
    async fn test_teacher_verification() {
        let (pool, service) = setup_test_service().await;
        let admin = test_support::user(&pool, "admin@example.com", UserRole::Admin).await;
        let teacher = test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let student = test_support::user(&pool, "s@example.com", UserRole::Student).await;

        let profile_id = service
            .list_teacher_profiles(&admin, &ListParams::default())
            .await
            .unwrap()
            .items[0]
            .id;

        // unverified teachers are hidden from students
        assert!(service.get_teacher_profile(&student, profile_id).await.is_err());

        let self_verify = UpdateTeacherProfileInput {
            is_verified: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            service
                .update_teacher_profile(&teacher, profile_id, self_verify.clone())
                .await,
            Err(UserServiceError::Forbidden(_))
        ));

        let verified = service
            .update_teacher_profile(&admin, profile_id, self_verify)
            .await
            .unwrap();
        assert!(verified.is_verified);
        assert!(verified.verification_date.is_some());
        assert!(service.get_teacher_profile(&student, profile_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_leaderboard_lists_public_students() {
        let (pool, service) = setup_test_service().await;
        let user = test_support::user(&pool, "a@example.com", UserRole::Student).await;
        test_support::user(&pool, "t@example.com", UserRole::Teacher).await;
        let profile = service.own_profile(&user).await.unwrap();

        assert!(service.leaderboard().await.unwrap().is_empty());

        service
            .update_profile(
                &user,
                profile.id,
                UpdateProfileInput {
                    privacy_public_profile: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let board = service.leaderboard().await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, user.id);
        assert_eq!(board[0].rank, 1);
    }
}
