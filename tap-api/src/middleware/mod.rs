//! API Middleware

pub mod rate_limit;

pub use rate_limit::{rate_limit, start_cleanup_task, RateLimitConfig, RateLimitError, RateLimiter};
