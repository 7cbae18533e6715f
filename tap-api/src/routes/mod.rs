//! API route handlers

pub mod auth;
pub mod friends;
pub mod game;
pub mod health;
pub mod leaderboard;

use axum::{routing::get, routing::post, Router};

use crate::error::ApiError;
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Auth
        .route("/api/auth/login", post(auth::login))
        // Game
        .route("/api/game/save", post(game::save))
        .route("/api/game/load/:platform_id", get(game::load))
        .route("/api/game/purchase-booster", post(game::purchase_booster))
        // Leaderboard
        .route("/api/leaderboard/top", get(leaderboard::top))
        .route("/api/leaderboard/top/:limit", get(leaderboard::top))
        .route("/api/leaderboard/rank/:platform_id", get(leaderboard::rank))
        // Friends
        .route("/api/friends/add", post(friends::add))
        .route("/api/friends/list/:platform_id", get(friends::list))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
