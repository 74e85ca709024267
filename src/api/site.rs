//! Service discovery endpoints
//!
//! - GET / - Endpoint map
//! - GET /health - Database reachability plus request counters

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::middleware::AppState;

/// Response for the health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(api_root))
        .route("/health", get(health))
}

async fn api_root() -> Json<Value> {
    Json(json!({
        "name": "EcoLearn API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/api/v1/auth",
            "users": "/api/v1/users",
            "profiles": "/api/v1/profiles",
            "teacher_profiles": "/api/v1/teacher-profiles",
            "classes": "/api/v1/classes",
            "content": {
                "categories": "/api/v1/content/categories",
                "tags": "/api/v1/content/tags",
                "lessons": "/api/v1/content/lessons",
                "quizzes": "/api/v1/content/quizzes",
                "questions": "/api/v1/content/questions",
                "ratings": "/api/v1/content/ratings",
            },
            "challenges": {
                "challenges": "/api/v1/challenges/challenges",
                "submissions": "/api/v1/challenges/submissions",
                "ratings": "/api/v1/challenges/ratings",
                "favorites": "/api/v1/challenges/favorites",
                "discussions": "/api/v1/challenges/discussions",
                "carbon_footprint": "/api/v1/challenges/carbon-footprint",
            },
            "gamification": {
                "badges": "/api/v1/gamification/badges",
                "point_transactions": "/api/v1/gamification/point-transactions",
                "user_badges": "/api/v1/gamification/user-badges",
                "leaderboards": "/api/v1/gamification/leaderboards",
                "achievements": "/api/v1/gamification/achievements",
                "stats": "/api/v1/gamification/stats",
            },
            "health": "/health",
        }
    }))
}

/// 200 while the database answers, 503 otherwise
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = match crate::db::ping(&state.pool).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check could not reach the database: {:#}", e);
            false
        }
    };

    let stats = &state.request_stats;
    let body = HealthResponse {
        status: if db_ok { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        database: if db_ok { "connected" } else { "unreachable" },
        uptime_seconds: stats.uptime_seconds(),
        total_requests: stats.total_requests(),
        avg_response_time_ms: stats.avg_response_time_us() / 1000.0,
    };
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
