//! Data Transfer Objects for API requests and responses
//!
//! Wire names are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tap_core::{
    Account, BoosterKind, Boosters, FriendEntry, Progress, ProgressUpdate, RankingEntry,
};

// ============ Auth DTOs ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Raw launch payload as received by the mini-app
    pub init_data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub id: u64,
    pub platform_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.as_u64(),
            platform_id: account.platform_id.clone(),
            username: account.username.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            display_name: account.display_name(),
            created_at: account.created_at,
            last_active_at: account.last_active_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub account: AccountResponse,
    pub progress: ProgressResponse,
    pub token: String,
    /// True on the login that registered the account
    pub created: bool,
}

// ============ Game DTOs ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub coins: u64,
    pub energy: u64,
    pub max_energy: u64,
    pub coins_per_tap: u64,
    pub energy_regen_rate_ms: u64,
    pub total_earned: u64,
    pub total_taps: u64,
    pub boosters: Boosters,
    pub last_saved_at: DateTime<Utc>,
}

impl From<Progress> for ProgressResponse {
    fn from(p: Progress) -> Self {
        Self {
            coins: p.coins,
            energy: p.energy,
            max_energy: p.max_energy,
            coins_per_tap: p.coins_per_tap,
            energy_regen_rate_ms: p.energy_regen_rate_ms,
            total_earned: p.total_earned,
            total_taps: p.total_taps,
            boosters: p.boosters,
            last_saved_at: p.last_saved_at,
        }
    }
}

/// Progress plus the owner's profile fields
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub platform_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    #[serde(flatten)]
    pub progress: ProgressResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub platform_id: String,
    pub coins: i64,
    pub energy: i64,
    pub max_energy: i64,
    pub coins_per_tap: i64,
    pub energy_regen_rate_ms: i64,
    pub total_earned: i64,
    pub total_taps: i64,
    #[serde(default)]
    pub boosters: BTreeMap<BoosterKind, i64>,
}

impl SaveRequest {
    pub fn into_update(self) -> (String, ProgressUpdate) {
        let update = ProgressUpdate {
            coins: self.coins,
            energy: self.energy,
            max_energy: self.max_energy,
            coins_per_tap: self.coins_per_tap,
            energy_regen_rate_ms: self.energy_regen_rate_ms,
            total_earned: self.total_earned,
            total_taps: self.total_taps,
            boosters: self.boosters,
        };
        (self.platform_id, update)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseBoosterRequest {
    pub platform_id: String,
    /// One of `energyCapacity`, `energyRegen`, `coinsPerTap`
    #[serde(alias = "boosterType")]
    pub booster_kind: String,
    pub cost: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseBoosterResponse {
    pub success: bool,
    pub booster_kind: BoosterKind,
    pub new_level: u32,
    pub new_coins: u64,
    pub boosters: Boosters,
}

// ============ Leaderboard DTOs ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingResponse {
    pub rank: u64,
    pub platform_id: String,
    pub display_name: Option<String>,
    pub total_earned: u64,
    pub total_taps: u64,
}

impl From<RankingEntry> for RankingResponse {
    fn from(e: RankingEntry) -> Self {
        Self {
            rank: e.rank,
            platform_id: e.platform_id,
            display_name: e.display_name,
            total_earned: e.total_earned,
            total_taps: e.total_taps,
        }
    }
}

// ============ Friends DTOs ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFriendRequest {
    /// Referrer
    pub platform_id: String,
    /// Referee
    pub friend_platform_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFriendResponse {
    pub success: bool,
    /// False when the referral already existed
    pub bonus_given: bool,
    pub bonus: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendResponse {
    pub platform_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub total_earned: u64,
    pub friend_since: DateTime<Utc>,
}

impl From<FriendEntry> for FriendResponse {
    fn from(f: FriendEntry) -> Self {
        Self {
            platform_id: f.platform_id,
            username: f.username,
            first_name: f.first_name,
            total_earned: f.total_earned,
            friend_since: f.friend_since,
        }
    }
}

// ============ Health DTOs ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub store: String,
}
