//! Ranking Service
//!
//! Orders accounts by cumulative earnings. Ties fall back to account
//! creation time, then account id, so ranks are stable between calls.

use std::sync::Arc;

use super::OperationTimeout;
use crate::store::GameStore;
use tap_core::{
    rank_standings, GameError, GameResult, RankingEntry, DEFAULT_LEADERBOARD_LIMIT,
    MAX_LEADERBOARD_LIMIT,
};

pub struct RankingService {
    store: Arc<dyn GameStore>,
    timeout: OperationTimeout,
}

impl RankingService {
    pub fn new(store: Arc<dyn GameStore>, timeout: OperationTimeout) -> Self {
        Self { store, timeout }
    }

    /// Clamp a requested page size into `1..=MAX_LEADERBOARD_LIMIT`
    pub fn normalize_limit(requested: Option<usize>) -> usize {
        match requested {
            None | Some(0) => DEFAULT_LEADERBOARD_LIMIT,
            Some(limit) => limit.min(MAX_LEADERBOARD_LIMIT),
        }
    }

    async fn ranked(&self) -> GameResult<Vec<RankingEntry>> {
        let standings = self
            .timeout
            .run("list_standings", self.store.list_standings())
            .await?;
        Ok(rank_standings(standings))
    }

    /// The first `limit` entries; `limit` is used as given
    pub async fn top(&self, limit: usize) -> GameResult<Vec<RankingEntry>> {
        let mut ranked = self.ranked().await?;
        ranked.truncate(limit);
        Ok(ranked)
    }

    pub async fn rank_of(&self, platform_id: &str) -> GameResult<RankingEntry> {
        self.ranked()
            .await?
            .into_iter()
            .find(|entry| entry.platform_id == platform_id)
            .ok_or_else(|| GameError::NotFound(format!("User {} not found", platform_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ProgressService, ReferralService};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use tap_core::{AccountId, PlatformIdentity, ProgressUpdate};

    async fn earn(progress: &ProgressService, id: AccountId, total: i64) {
        progress
            .save(
                id,
                ProgressUpdate {
                    coins: total,
                    energy: 100,
                    max_energy: 100,
                    coins_per_tap: 1,
                    energy_regen_rate_ms: 1_800_000,
                    total_earned: total,
                    total_taps: total,
                    boosters: Default::default(),
                },
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_normalize_limit() {
        assert_eq!(RankingService::normalize_limit(None), DEFAULT_LEADERBOARD_LIMIT);
        assert_eq!(RankingService::normalize_limit(Some(0)), DEFAULT_LEADERBOARD_LIMIT);
        assert_eq!(RankingService::normalize_limit(Some(5)), 5);
        assert_eq!(
            RankingService::normalize_limit(Some(1_000_000)),
            MAX_LEADERBOARD_LIMIT
        );
    }

    #[tokio::test]
    async fn test_top_and_rank_of() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
        let progress = ProgressService::new(store.clone(), OperationTimeout::default());
        let ranking = RankingService::new(store.clone(), OperationTimeout::default());

        let mut ids = Vec::new();
        for pid in ["A", "B", "C"] {
            let (account, _) = store
                .create_account(&PlatformIdentity::new(pid), Utc::now())
                .await
                .unwrap();
            ids.push(account.id);
        }
        earn(&progress, ids[0], 100).await;
        earn(&progress, ids[1], 300).await;
        earn(&progress, ids[2], 200).await;

        let top = ranking.top(2).await.unwrap();
        let order: Vec<_> = top.iter().map(|e| (e.platform_id.as_str(), e.rank)).collect();
        assert_eq!(order, vec![("B", 1), ("C", 2)]);

        assert_eq!(ranking.rank_of("A").await.unwrap().rank, 3);
        assert!(matches!(
            ranking.rank_of("nobody").await,
            Err(GameError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ties_are_stable() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
        let ranking = RankingService::new(store.clone(), OperationTimeout::default());
        for pid in ["first", "second", "third"] {
            store
                .create_account(&PlatformIdentity::new(pid), Utc::now())
                .await
                .unwrap();
        }

        let a = ranking.top(10).await.unwrap();
        let b = ranking.top(10).await.unwrap();
        assert_eq!(a, b);
        let ranks: Vec<_> = a.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(a[0].platform_id, "first");
    }

    /// Login, referral, save and purchase end to end
    #[tokio::test]
    async fn test_referral_then_purchase_scenario() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
        let timeout = OperationTimeout::default();
        let accounts = crate::services::AccountService::new(store.clone(), timeout);
        let progress = ProgressService::new(store.clone(), timeout);
        let referrals = ReferralService::new(store.clone(), timeout);
        let ranking = RankingService::new(store.clone(), timeout);

        let a = accounts.login(&PlatformIdentity::new("A")).await.unwrap();
        let b = accounts.login(&PlatformIdentity::new("B")).await.unwrap();
        assert!(a.created && b.created);

        referrals.add_referral("A", "B").await.unwrap();
        let b_progress = progress.load(b.account.id).await.unwrap();
        assert_eq!(b_progress.coins, 500);

        progress
            .purchase_booster(b.account.id, tap_core::BoosterKind::CoinsPerTap, 200)
            .await
            .unwrap();
        let b_progress = progress.load(b.account.id).await.unwrap();
        assert_eq!(b_progress.coins, 300);
        assert_eq!(b_progress.total_earned, 500);

        let top = ranking.top(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert!(top.iter().all(|e| e.total_earned == 500));
        assert_eq!(top[0].platform_id, "A");
    }
}
