//! Progress Service
//!
//! Load, save and booster purchase over a single account's progress record.
//! Every mutation goes through [`GameStore::update_progress`], so checks and
//! writes for one account never interleave.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::OperationTimeout;
use crate::store::GameStore;
use tap_core::{
    validate_cost, AccountId, BoosterKind, GameError, GameResult, Progress, ProgressUpdate,
    PurchaseReceipt, SavedAck,
};

/// Progress Service
pub struct ProgressService {
    store: Arc<dyn GameStore>,
    timeout: OperationTimeout,
}

impl ProgressService {
    pub fn new(store: Arc<dyn GameStore>, timeout: OperationTimeout) -> Self {
        Self { store, timeout }
    }

    pub async fn load(&self, id: AccountId) -> GameResult<Progress> {
        self.timeout
            .run("get_progress", self.store.get_progress(id))
            .await?
            .ok_or_else(|| GameError::NotFound(format!("Progress for account {} not found", id)))
    }

    /// Replace the stored progress with a client snapshot.
    ///
    /// Concurrent saves are last-write-wins, but a snapshot that would lower
    /// cumulative counters or booster levels is rejected.
    pub async fn save(&self, id: AccountId, update: ProgressUpdate) -> GameResult<SavedAck> {
        let now = Utc::now();
        let saved = self
            .timeout
            .run(
                "save_progress",
                self.store.update_progress(
                    id,
                    Arc::new(move |current: &Progress| update.apply(current, now)),
                ),
            )
            .await?;

        debug!(
            account_id = %id,
            coins = saved.coins,
            total_earned = saved.total_earned,
            "Progress saved"
        );
        Ok(SavedAck {
            saved_at: saved.last_saved_at,
        })
    }

    /// Buy one level of `kind` for `cost` coins
    pub async fn purchase_booster(
        &self,
        id: AccountId,
        kind: BoosterKind,
        cost: i64,
    ) -> GameResult<PurchaseReceipt> {
        let cost = validate_cost(cost)?;
        let updated = self
            .timeout
            .run(
                "purchase_booster",
                self.store.update_progress(
                    id,
                    Arc::new(move |current: &Progress| current.purchase(kind, cost)),
                ),
            )
            .await?;

        let new_level = updated.boosters.level(kind);
        info!(account_id = %id, booster = %kind, new_level, cost, "Booster purchased");

        Ok(PurchaseReceipt {
            kind,
            new_level,
            new_coins: updated.coins,
            boosters: updated.boosters,
        })
    }
}
