//! Referral types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;

/// "referrer introduced referee"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub referrer_id: AccountId,
    pub referee_id: AccountId,
    pub created_at: DateTime<Utc>,
    /// Set once, together with the edge itself
    pub bonus_granted: bool,
}

impl ReferralEdge {
    pub fn new(referrer_id: AccountId, referee_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            referrer_id,
            referee_id,
            created_at: now,
            bonus_granted: true,
        }
    }

    /// Composite key: referrer bytes followed by referee bytes
    pub fn key(referrer_id: AccountId, referee_id: AccountId) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&referrer_id.to_key());
        key[8..].copy_from_slice(&referee_id.to_key());
        key
    }
}

/// Outcome of linking a referral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralOutcome {
    /// Edge recorded now and the bonus granted to both accounts
    Linked,
    /// Edge already existed; nothing changed
    AlreadyLinked,
}

impl ReferralOutcome {
    pub fn bonus_granted(&self) -> bool {
        matches!(self, ReferralOutcome::Linked)
    }
}

/// A referee as seen from its referrer's friend list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    pub platform_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub total_earned: u64,
    pub friend_since: DateTime<Utc>,
}
