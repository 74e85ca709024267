//! API layer - HTTP handlers and routing
//!
//! Every endpoint lives under `/api/v1`:
//! - Identity: auth, users, profiles, teacher profiles, classes
//! - Content: categories, tags, lessons, quizzes, questions, ratings
//! - Challenges: challenges, submissions, ratings, favorites, discussions,
//!   carbon footprint
//! - Gamification: badges, point transactions, user badges, leaderboards,
//!   achievements, stats
//!
//! `GET /` and `GET /health` sit at the root.

pub mod auth;
pub mod carbon;
pub mod categories;
pub mod challenges;
pub mod classes;
pub mod common;
pub mod discussions;
pub mod gamification;
pub mod leaderboards;
pub mod lessons;
pub mod middleware;
pub mod quizzes;
pub mod ratings;
pub mod site;
pub mod submissions;
pub mod tags;
pub mod users;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser, RequestStats};

/// Build the `/api/v1` router
pub fn build_api_router() -> Router<AppState> {
    // Identity routes need a caller on every endpoint
    let identity = Router::new()
        .nest("/users", users::users_router())
        .nest("/profiles", users::profiles_router())
        .nest("/teacher-profiles", users::teacher_profiles_router())
        .nest("/classes", classes::router())
        .route_layer(axum_middleware::from_fn(middleware::require_auth));

    let content = Router::new()
        .nest("/categories", categories::router())
        .nest("/tags", tags::router())
        .nest("/lessons", lessons::router())
        .nest("/quizzes", quizzes::router())
        .nest("/questions", quizzes::questions_router())
        .nest("/ratings", ratings::router());

    let challenges = Router::new()
        .nest("/challenges", challenges::router())
        .nest("/submissions", submissions::router())
        .nest("/ratings", challenges::ratings_router())
        .nest("/favorites", challenges::favorites_router())
        .nest("/discussions", discussions::router())
        .nest("/carbon-footprint", carbon::router());

    // Badges are a public catalog; the rest of gamification is per caller
    let gamification_private = Router::new()
        .nest("/point-transactions", gamification::transactions_router())
        .nest("/user-badges", gamification::user_badges_router())
        .nest("/achievements", gamification::achievements_router())
        .nest("/leaderboards", leaderboards::router())
        .nest("/stats", leaderboards::stats_router())
        .route_layer(axum_middleware::from_fn(middleware::require_auth));
    let gamification = Router::new()
        .nest("/badges", gamification::badges_router())
        .merge(gamification_private);

    Router::new()
        .nest("/auth", auth::router())
        .nest("/content", content)
        .nest("/challenges", challenges)
        .nest("/gamification", gamification)
        .merge(identity)
}

/// Build the complete router with middleware
///
/// `cors_origin` is a single origin, or `*` to allow any.
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let origin = if cors_origin == "*" {
        AllowOrigin::any()
    } else {
        match cors_origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!("Invalid CORS origin {:?}, allowing any origin", cors_origin);
                AllowOrigin::any()
            }
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(site::router())
        .nest("/api/v1", build_api_router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}
