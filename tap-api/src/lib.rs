//! Tap Game REST API
//!
//! HTTP surface over the game services.
//!
//! # Endpoints
//!
//! ## Health
//! - `GET /health` - Store reachability and version
//!
//! ## Auth
//! - `POST /api/auth/login` - Verify launch data, register on first login, issue a token
//!
//! ## Game
//! - `POST /api/game/save` - Replace the progress snapshot
//! - `GET /api/game/load/:platform_id` - Load progress
//! - `POST /api/game/purchase-booster` - Buy one booster level
//!
//! ## Leaderboard
//! - `GET /api/leaderboard/top/:limit?` - Top accounts by total earned
//! - `GET /api/leaderboard/rank/:platform_id` - One account's rank
//!
//! ## Friends
//! - `POST /api/friends/add` - Record a referral
//! - `GET /api/friends/list/:platform_id` - Accounts referred by a user
//!
//! # Usage
//!
//! ```ignore
//! use tap_api::{run_server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig::try_from_env()?;
//!     run_server(config).await
//! }
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::{TokenClaims, TokenIssuer};
pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use middleware::{RateLimitConfig, RateLimiter};
pub use routes::create_router;
pub use server::{
    build_app, create_server, run_server, start_background_server, ServerResult, MAX_BODY_BYTES,
};
pub use state::AppState;

/// API version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port
pub const DEFAULT_PORT: u16 = 3000;
