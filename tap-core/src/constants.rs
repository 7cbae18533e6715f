//! Game constants

/// Coins granted to both parties when a referral edge is first recorded
pub const REFERRAL_BONUS: u64 = 500;

/// Starting coin balance
pub const DEFAULT_COINS: u64 = 0;

/// Starting (and maximum) energy
pub const DEFAULT_ENERGY: u64 = 100;

/// Starting energy capacity
pub const DEFAULT_MAX_ENERGY: u64 = 100;

/// Starting tap multiplier
pub const DEFAULT_COINS_PER_TAP: u64 = 1;

/// Time to regenerate one energy unit (30 minutes)
pub const DEFAULT_ENERGY_REGEN_RATE_MS: u64 = 30 * 60 * 1000;

/// Highest purchasable level of any booster kind
pub const MAX_BOOSTER_LEVEL: u32 = 4;

/// Leaderboard size when the caller does not ask for one
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 50;

/// Upper bound on a single leaderboard page
pub const MAX_LEADERBOARD_LIMIT: usize = 1000;
