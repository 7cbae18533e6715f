//! Tap Core - game progress rules for the tap-to-earn backend
//!
//! This crate provides the domain types and pure rules shared by the
//! storage and API layers:
//! - Accounts keyed by an external platform identity
//! - Progress snapshots (coins, energy, boosters, cumulative totals)
//! - Referral edges and their one-time bonus
//! - Leaderboard ordering
//! - Launch-payload (init data) signature verification
//!
//! Nothing in here performs I/O. Persistence and transport live in
//! `tap-db` and `tap-api`.

pub mod constants;
pub mod error;
pub mod identity;
pub mod types;

pub use constants::*;
pub use error::*;
pub use identity::{sign_init_data, verify, InitDataVerifier};
pub use types::*;
