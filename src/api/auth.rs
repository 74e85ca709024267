//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Create an account
//! - POST /api/v1/auth/login - Exchange credentials for a token pair
//! - POST /api/v1/auth/refresh - Exchange a refresh token for an access token

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::User;
use crate::services::user::{LoginResponse, RefreshResponse, RegisterInput};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let user = state.user_service.register(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user,
            message: "User registered successfully".to_string(),
        }),
    ))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = body.email.trim().to_lowercase();
    Ok(Json(state.user_service.login(&email, &body.password).await?))
}

/// POST /api/v1/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    Ok(Json(state.user_service.refresh(&body.refresh).await?))
}
