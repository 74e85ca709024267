//! API middleware
//!
//! Contains:
//! - Application state and its construction from configuration
//! - Bearer token authentication and the caller extractors
//! - The JSON error type every handler returns
//! - Request statistics

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxCarbonRepository, SqlxCategoryRepository, SqlxChallengeRepository, SqlxClassRepository,
    SqlxDiscussionRepository, SqlxGamificationRepository, SqlxLeaderboardRepository,
    SqlxLessonRepository, SqlxQuizRepository, SqlxRatingRepository, SqlxSubmissionRepository,
    SqlxTagRepository, SqlxUserRepository,
};
use crate::models::User;
use crate::services::{
    BadgeService, BadgeServiceError, CarbonService, CarbonServiceError, CategoryService,
    CategoryServiceError, ChallengeService, ChallengeServiceError, ClassService, ClassServiceError,
    DiscussionService, DiscussionServiceError, GamificationService, GamificationServiceError,
    LeaderboardService, LeaderboardServiceError, LessonService, LessonServiceError, QuestionService,
    QuestionServiceError, QuizService, QuizServiceError, RatingService, RatingServiceError,
    StatsService, StatsServiceError, SubmissionService, SubmissionServiceError, TagService,
    TagServiceError, TokenService, UserService, UserServiceError,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Total response time in microseconds (for calculating average)
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request with its response time
    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub user_service: Arc<UserService>,
    pub class_service: Arc<ClassService>,
    pub category_service: Arc<CategoryService>,
    pub tag_service: Arc<TagService>,
    pub lesson_service: Arc<LessonService>,
    pub quiz_service: Arc<QuizService>,
    pub question_service: Arc<QuestionService>,
    pub rating_service: Arc<RatingService>,
    pub challenge_service: Arc<ChallengeService>,
    pub submission_service: Arc<SubmissionService>,
    pub discussion_service: Arc<DiscussionService>,
    pub carbon_service: Arc<CarbonService>,
    pub gamification_service: Arc<GamificationService>,
    pub badge_service: Arc<BadgeService>,
    pub leaderboard_service: Arc<LeaderboardService>,
    pub stats_service: Arc<StatsService>,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn new(pool: SqlitePool, config: &Config, cache: Arc<Cache>) -> Self {
        let users = SqlxUserRepository::boxed(pool.clone());
        let classes = SqlxClassRepository::boxed(pool.clone());
        let categories = SqlxCategoryRepository::boxed(pool.clone());
        let tags = SqlxTagRepository::boxed(pool.clone());
        let lessons = SqlxLessonRepository::boxed(pool.clone());
        let quizzes = SqlxQuizRepository::boxed(pool.clone());
        let ratings = SqlxRatingRepository::boxed(pool.clone());
        let challenges = SqlxChallengeRepository::boxed(pool.clone());
        let submissions = SqlxSubmissionRepository::boxed(pool.clone());
        let discussions = SqlxDiscussionRepository::boxed(pool.clone());
        let footprints = SqlxCarbonRepository::boxed(pool.clone());
        let gamification = SqlxGamificationRepository::boxed(pool.clone());
        let leaderboards = SqlxLeaderboardRepository::boxed(pool.clone());
        let tokens = Arc::new(TokenService::new(&config.auth));

        Self {
            user_service: Arc::new(UserService::new(pool.clone(), users.clone(), tokens, cache.clone())),
            class_service: Arc::new(ClassService::new(classes.clone())),
            category_service: Arc::new(CategoryService::new(categories.clone(), cache.clone())),
            tag_service: Arc::new(TagService::new(tags.clone())),
            lesson_service: Arc::new(LessonService::new(
                pool.clone(),
                lessons.clone(),
                categories.clone(),
                tags.clone(),
                ratings.clone(),
                cache.clone(),
            )),
            quiz_service: Arc::new(QuizService::new(
                pool.clone(),
                quizzes.clone(),
                lessons.clone(),
                categories.clone(),
                tags.clone(),
                ratings.clone(),
                cache.clone(),
            )),
            question_service: Arc::new(QuestionService::new(quizzes.clone())),
            rating_service: Arc::new(RatingService::new(ratings, lessons, quizzes)),
            challenge_service: Arc::new(ChallengeService::new(
                challenges.clone(),
                submissions.clone(),
                categories,
                tags,
                cache.clone(),
            )),
            submission_service: Arc::new(SubmissionService::new(
                pool.clone(),
                submissions,
                challenges.clone(),
                cache.clone(),
            )),
            discussion_service: Arc::new(DiscussionService::new(discussions, challenges.clone())),
            carbon_service: Arc::new(CarbonService::new(footprints, challenges)),
            gamification_service: Arc::new(GamificationService::new(
                pool.clone(),
                gamification.clone(),
                users.clone(),
                cache.clone(),
            )),
            badge_service: Arc::new(BadgeService::new(
                pool.clone(),
                gamification.clone(),
                users.clone(),
                cache.clone(),
            )),
            leaderboard_service: Arc::new(LeaderboardService::new(
                leaderboards,
                gamification.clone(),
                classes,
                cache.clone(),
            )),
            stats_service: Arc::new(StatsService::new(gamification, users, cache)),
            request_stats: Arc::new(RequestStats::new()),
            pool,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    /// The cause is logged, never sent to the client
    pub fn internal_error(error: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", error);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Map the shared service error variants onto API errors
macro_rules! from_service_errors {
    ($($error:ident),* $(,)?) => {
        $(
            impl From<$error> for ApiError {
                fn from(e: $error) -> Self {
                    match e {
                        $error::NotFound(msg) => ApiError::not_found(msg),
                        $error::ValidationError(msg) => ApiError::validation_error(msg),
                        $error::Forbidden(msg) => ApiError::forbidden(msg),
                        $error::Conflict(msg) => ApiError::conflict(msg),
                        $error::InternalError(e) => ApiError::internal_error(e),
                    }
                }
            }
        )*
    };
}

from_service_errors!(
    BadgeServiceError,
    CarbonServiceError,
    CategoryServiceError,
    ChallengeServiceError,
    ClassServiceError,
    DiscussionServiceError,
    GamificationServiceError,
    LeaderboardServiceError,
    LessonServiceError,
    QuestionServiceError,
    QuizServiceError,
    RatingServiceError,
    StatsServiceError,
    SubmissionServiceError,
    TagServiceError,
);

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::NotFound(msg) => ApiError::not_found(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::Conflict(msg) => ApiError::conflict(msg),
            UserServiceError::InternalError(e) => ApiError::internal_error(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))
    }
}

/// The caller when one authenticated; anonymous otherwise
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

/// Extract a bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Resolve the bearer token, if any, into an `AuthenticatedUser`.
///
/// Requests without a token pass through anonymously; a token that does
/// not verify is rejected.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_bearer_token(&request) {
        let user = state.user_service.authenticate(&token).await?;
        request.extensions_mut().insert(AuthenticatedUser(user));
    }
    Ok(next.run(request).await)
}

/// Reject anonymous requests
pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return Err(ApiError::unauthorized(
            "Authentication credentials were not provided",
        ));
    }
    Ok(next.run(request).await)
}

/// Request statistics middleware
///
/// Records request count and response time.
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}
