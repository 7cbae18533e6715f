//! Referral Service

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{resolve_account, OperationTimeout};
use crate::store::GameStore;
use tap_core::{FriendEntry, GameError, GameResult, ReferralOutcome, REFERRAL_BONUS};

/// Records referrals and grants the one-time bonus
pub struct ReferralService {
    store: Arc<dyn GameStore>,
    timeout: OperationTimeout,
    bonus: u64,
}

impl ReferralService {
    pub fn new(store: Arc<dyn GameStore>, timeout: OperationTimeout) -> Self {
        Self {
            store,
            timeout,
            bonus: REFERRAL_BONUS,
        }
    }

    pub fn bonus(&self) -> u64 {
        self.bonus
    }

    /// Link `referee` to `referrer`, crediting both the first time only.
    ///
    /// Repeating an existing link succeeds without a second bonus.
    pub async fn add_referral(
        &self,
        referrer_platform_id: &str,
        referee_platform_id: &str,
    ) -> GameResult<ReferralOutcome> {
        let referrer = resolve_account(self.store.as_ref(), self.timeout, referrer_platform_id).await?;
        let referee = resolve_account(self.store.as_ref(), self.timeout, referee_platform_id).await?;

        if referrer.id == referee.id {
            return Err(GameError::SelfReferral);
        }

        let outcome = self
            .timeout
            .run(
                "link_referral",
                self.store
                    .link_referral(referrer.id, referee.id, self.bonus, Utc::now()),
            )
            .await?;

        match outcome {
            ReferralOutcome::Linked => info!(
                referrer = %referrer.platform_id,
                referee = %referee.platform_id,
                bonus = self.bonus,
                "Referral recorded"
            ),
            ReferralOutcome::AlreadyLinked => debug!(
                referrer = %referrer.platform_id,
                referee = %referee.platform_id,
                "Referral already recorded"
            ),
        }
        Ok(outcome)
    }

    /// Accounts referred by `platform_id`, highest earners first
    pub async fn list_friends(&self, platform_id: &str) -> GameResult<Vec<FriendEntry>> {
        let account = resolve_account(self.store.as_ref(), self.timeout, platform_id).await?;
        let edges = self
            .timeout
            .run("list_referrals", self.store.list_referrals(account.id))
            .await?;

        let mut friends = Vec::with_capacity(edges.len());
        for edge in edges {
            let friend = self
                .timeout
                .run("get_account", self.store.get_account(edge.referee_id))
                .await?;
            let progress = self
                .timeout
                .run("get_progress", self.store.get_progress(edge.referee_id))
                .await?;

            match (friend, progress) {
                (Some(friend), Some(progress)) => friends.push(FriendEntry {
                    platform_id: friend.platform_id,
                    username: friend.username,
                    first_name: friend.first_name,
                    total_earned: progress.total_earned,
                    friend_since: edge.created_at,
                }),
                _ => warn!(
                    referrer = %account.id,
                    referee = %edge.referee_id,
                    "Referral points at a missing account"
                ),
            }
        }

        friends.sort_by(|a, b| {
            b.total_earned
                .cmp(&a.total_earned)
                .then(a.friend_since.cmp(&b.friend_since))
        });
        Ok(friends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ProgressService;
    use crate::store::{MemoryStore, SledStore};
    use tap_core::{PlatformIdentity, ProgressUpdate};
    use tokio::sync::Barrier;

    struct Fixture {
        store: Arc<dyn GameStore>,
        referrals: ReferralService,
        progress: ProgressService,
    }

    async fn fixture(platform_ids: &[&str]) -> Fixture {
        fixture_on(Arc::new(MemoryStore::new()), platform_ids).await
    }

    async fn fixture_on(store: Arc<dyn GameStore>, platform_ids: &[&str]) -> Fixture {
        for id in platform_ids {
            store
                .create_account(&PlatformIdentity::new(*id).with_username(format!("user{}", id)), Utc::now())
                .await
                .unwrap();
        }
        Fixture {
            referrals: ReferralService::new(store.clone(), OperationTimeout::default()),
            progress: ProgressService::new(store.clone(), OperationTimeout::default()),
            store,
        }
    }

    async fn coins_of(fixture: &Fixture, platform_id: &str) -> (u64, u64) {
        let account = fixture
            .store
            .find_account_by_platform_id(platform_id)
            .await
            .unwrap()
            .unwrap();
        let progress = fixture.progress.load(account.id).await.unwrap();
        (progress.coins, progress.total_earned)
    }

    #[tokio::test]
    async fn test_bonus_granted_once() {
        let f = fixture(&["A", "B"]).await;

        assert_eq!(f.referrals.add_referral("A", "B").await.unwrap(), ReferralOutcome::Linked);
        assert_eq!(
            f.referrals.add_referral("A", "B").await.unwrap(),
            ReferralOutcome::AlreadyLinked
        );

        assert_eq!(coins_of(&f, "A").await, (500, 500));
        assert_eq!(coins_of(&f, "B").await, (500, 500));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_grant_once() {
        for store in [
            Arc::new(MemoryStore::new()) as Arc<dyn GameStore>,
            Arc::new(SledStore::temporary().unwrap()) as Arc<dyn GameStore>,
        ] {
            let f = fixture_on(store, &["A", "B"]).await;
            let referrals = Arc::new(ReferralService::new(f.store.clone(), OperationTimeout::default()));
            let barrier = Arc::new(Barrier::new(8));

            // Both directions race; each edge is its own grant
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let referrals = referrals.clone();
                    let barrier = barrier.clone();
                    let (from, to) = if i % 2 == 0 { ("A", "B") } else { ("B", "A") };
                    tokio::spawn(async move {
                        barrier.wait().await;
                        referrals.add_referral(from, to).await
                    })
                })
                .collect();

            let mut linked = 0;
            for handle in handles {
                if handle.await.unwrap().unwrap() == ReferralOutcome::Linked {
                    linked += 1;
                }
            }
            assert_eq!(linked, 2, "{} store", f.store.backend_name());

            assert_eq!(coins_of(&f, "A").await, (1_000, 1_000));
            assert_eq!(coins_of(&f, "B").await, (1_000, 1_000));
        }
    }

    #[tokio::test]
    async fn test_self_referral() {
        let f = fixture(&["A"]).await;
        assert!(matches!(
            f.referrals.add_referral("A", "A").await,
            Err(GameError::SelfReferral)
        ));
        assert_eq!(coins_of(&f, "A").await, (0, 0));
    }

    #[tokio::test]
    async fn test_unknown_party() {
        let f = fixture(&["A"]).await;
        assert!(matches!(
            f.referrals.add_referral("A", "ghost").await,
            Err(GameError::NotFound(_))
        ));
        assert!(matches!(
            f.referrals.add_referral("ghost", "A").await,
            Err(GameError::NotFound(_))
        ));
        assert_eq!(coins_of(&f, "A").await, (0, 0));
    }

    #[tokio::test]
    async fn test_friends_sorted_by_earnings() {
        let f = fixture(&["A", "B", "C", "D"]).await;
        f.referrals.add_referral("A", "B").await.unwrap();
        f.referrals.add_referral("A", "C").await.unwrap();

        let c = f.store.find_account_by_platform_id("C").await.unwrap().unwrap();
        f.progress
            .save(
                c.id,
                ProgressUpdate {
                    coins: 900,
                    energy: 100,
                    max_energy: 100,
                    coins_per_tap: 1,
                    energy_regen_rate_ms: 1_800_000,
                    total_earned: 900,
                    total_taps: 400,
                    boosters: Default::default(),
                },
            )
            .await
            .unwrap();

        let friends = f.referrals.list_friends("A").await.unwrap();
        let ids: Vec<_> = friends.iter().map(|f| f.platform_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
        assert_eq!(friends[0].total_earned, 900);
        assert_eq!(friends[1].username.as_deref(), Some("userB"));

        assert!(f.referrals.list_friends("D").await.unwrap().is_empty());
        assert!(f.referrals.list_friends("B").await.unwrap().is_empty());
    }
}
