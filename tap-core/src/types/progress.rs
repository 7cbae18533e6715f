//! Progress types and transition rules
//!
//! A progress record is always valid: every transition below either returns
//! a new valid record or an error, and never mutates in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::account::AccountId;
use super::booster::{BoosterKind, Boosters};
use crate::constants::*;
use crate::error::{GameError, GameResult};

/// A player's game state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub account_id: AccountId,
    /// Spendable balance
    pub coins: u64,
    pub energy: u64,
    pub max_energy: u64,
    pub coins_per_tap: u64,
    /// Time to regenerate one energy unit
    pub energy_regen_rate_ms: u64,
    /// Cumulative earnings, never reset
    pub total_earned: u64,
    /// Cumulative taps, never reset
    pub total_taps: u64,
    pub boosters: Boosters,
    pub last_saved_at: DateTime<Utc>,
}

impl Progress {
    /// Default progress created alongside a new account
    pub fn new_default(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            coins: DEFAULT_COINS,
            energy: DEFAULT_ENERGY,
            max_energy: DEFAULT_MAX_ENERGY,
            coins_per_tap: DEFAULT_COINS_PER_TAP,
            energy_regen_rate_ms: DEFAULT_ENERGY_REGEN_RATE_MS,
            total_earned: 0,
            total_taps: 0,
            boosters: Boosters::new(),
            last_saved_at: now,
        }
    }

    /// Buy one level of a booster.
    ///
    /// The level cap is checked before the balance, so a capped purchase
    /// never charges.
    pub fn purchase(&self, kind: BoosterKind, cost: u64) -> GameResult<Progress> {
        let mut next = self.clone();
        next.boosters.increment(kind)?;

        if self.coins < cost {
            return Err(GameError::InsufficientFunds {
                required: cost,
                available: self.coins,
            });
        }
        next.coins = self.coins - cost;
        Ok(next)
    }

    /// Credit a bonus to both the balance and cumulative earnings
    pub fn credit(&self, amount: u64) -> GameResult<Progress> {
        let overflow = || GameError::InvalidState("Coin balance overflow".to_string());
        let mut next = self.clone();
        next.coins = self.coins.checked_add(amount).ok_or_else(overflow)?;
        next.total_earned = self.total_earned.checked_add(amount).ok_or_else(overflow)?;
        Ok(next)
    }
}

/// Full client-submitted snapshot for `save`.
///
/// Fields are signed so that negative values can be reported as an invalid
/// state rather than a decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub coins: i64,
    pub energy: i64,
    pub max_energy: i64,
    pub coins_per_tap: i64,
    pub energy_regen_rate_ms: i64,
    pub total_earned: i64,
    pub total_taps: i64,
    /// Kinds left out keep their stored level
    #[serde(default)]
    pub boosters: BTreeMap<BoosterKind, i64>,
}

impl ProgressUpdate {
    /// Validate the snapshot against the stored record and build the
    /// replacement record.
    pub fn apply(&self, current: &Progress, now: DateTime<Utc>) -> GameResult<Progress> {
        let coins = non_negative("coins", self.coins)?;
        let energy = non_negative("energy", self.energy)?;
        let max_energy = non_negative("maxEnergy", self.max_energy)?;
        let coins_per_tap = non_negative("coinsPerTap", self.coins_per_tap)?;
        let energy_regen_rate_ms = non_negative("energyRegenRateMs", self.energy_regen_rate_ms)?;
        let total_earned = non_negative("totalEarned", self.total_earned)?;
        let total_taps = non_negative("totalTaps", self.total_taps)?;

        if energy > max_energy {
            return Err(GameError::InvalidState(format!(
                "energy {} exceeds maxEnergy {}",
                energy, max_energy
            )));
        }
        if coins_per_tap == 0 {
            return Err(GameError::InvalidState("coinsPerTap must be positive".to_string()));
        }
        if energy_regen_rate_ms == 0 {
            return Err(GameError::InvalidState(
                "energyRegenRateMs must be positive".to_string(),
            ));
        }
        if total_earned < current.total_earned {
            return Err(GameError::InvalidState(format!(
                "totalEarned cannot decrease ({} -> {})",
                current.total_earned, total_earned
            )));
        }
        if total_taps < current.total_taps {
            return Err(GameError::InvalidState(format!(
                "totalTaps cannot decrease ({} -> {})",
                current.total_taps, total_taps
            )));
        }
        if coins > total_earned {
            return Err(GameError::InvalidState(format!(
                "coins {} exceed totalEarned {}",
                coins, total_earned
            )));
        }

        let mut boosters = current.boosters.clone();
        for (&kind, &level) in &self.boosters {
            let level = u32::try_from(level).map_err(|_| {
                GameError::InvalidState(format!("Booster {} level {} is out of range", kind, level))
            })?;
            let stored = current.boosters.level(kind);
            if level < stored {
                return Err(GameError::InvalidState(format!(
                    "Booster {} level cannot decrease ({} -> {})",
                    kind, stored, level
                )));
            }
            boosters.set_level(kind, level)?;
        }

        Ok(Progress {
            account_id: current.account_id,
            coins,
            energy,
            max_energy,
            coins_per_tap,
            energy_regen_rate_ms,
            total_earned,
            total_taps,
            boosters,
            last_saved_at: now,
        })
    }
}

fn non_negative(field: &str, value: i64) -> GameResult<u64> {
    u64::try_from(value)
        .map_err(|_| GameError::InvalidState(format!("{} must not be negative (got {})", field, value)))
}

/// Validate a client-supplied booster cost
pub fn validate_cost(cost: i64) -> GameResult<u64> {
    non_negative("cost", cost)
}

/// Acknowledgement of a successful save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAck {
    pub saved_at: DateTime<Utc>,
}

/// Result of a successful booster purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub kind: BoosterKind,
    pub new_level: u32,
    pub new_coins: u64,
    pub boosters: Boosters,
}
