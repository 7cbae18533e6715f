//! In-memory store
//!
//! Used by tests and development. Each progress record sits behind its own
//! mutex, so updates to one account serialize while different accounts
//! proceed independently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::{GameStore, ProgressTransition};
use tap_core::{
    Account, AccountId, GameError, GameResult, PlatformIdentity, Progress, ReferralEdge,
    ReferralOutcome,
};

type ProgressCell = Arc<Mutex<Progress>>;

/// In-memory game store
#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    accounts: RwLock<HashMap<AccountId, Account>>,
    platform_index: RwLock<HashMap<String, AccountId>>,
    progress: RwLock<HashMap<AccountId, ProgressCell>>,
    referrals: RwLock<BTreeMap<(AccountId, AccountId), ReferralEdge>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all data
    pub async fn clear(&self) {
        self.accounts.write().await.clear();
        self.platform_index.write().await.clear();
        self.progress.write().await.clear();
        self.referrals.write().await.clear();
    }

    async fn progress_cell(&self, id: AccountId) -> GameResult<ProgressCell> {
        self.progress
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| GameError::NotFound(format!("Progress for account {} not found", id)))
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> GameResult<()> {
        Ok(())
    }

    // ==================== Accounts ====================

    async fn get_account(&self, id: AccountId) -> GameResult<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_account_by_platform_id(&self, platform_id: &str) -> GameResult<Option<Account>> {
        let id = match self.platform_index.read().await.get(platform_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_account(id).await
    }

    async fn create_account(
        &self,
        identity: &PlatformIdentity,
        now: DateTime<Utc>,
    ) -> GameResult<(Account, Progress)> {
        // Held for the whole creation so concurrent first logins serialize
        let mut index = self.platform_index.write().await;
        if index.contains_key(&identity.external_id) {
            return Err(GameError::Conflict(format!(
                "Account for platform id {} already exists",
                identity.external_id
            )));
        }

        let id = AccountId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let account = Account::from_identity(id, identity, now);
        let progress = Progress::new_default(id, now);

        self.accounts.write().await.insert(id, account.clone());
        self.progress
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(progress.clone())));
        // Index last: lookups by platform id only ever see complete accounts
        index.insert(identity.external_id.clone(), id);

        Ok((account, progress))
    }

    async fn touch_last_active(&self, id: AccountId, at: DateTime<Utc>) -> GameResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| GameError::NotFound(format!("Account {} not found", id)))?;
        account.touch(at);
        Ok(())
    }

    // ==================== Progress ====================

    async fn get_progress(&self, id: AccountId) -> GameResult<Option<Progress>> {
        let cell = match self.progress.read().await.get(&id) {
            Some(cell) => cell.clone(),
            None => return Ok(None),
        };
        let progress = cell.lock().await.clone();
        Ok(Some(progress))
    }

    async fn update_progress(
        &self,
        id: AccountId,
        transition: ProgressTransition,
    ) -> GameResult<Progress> {
        let cell = self.progress_cell(id).await?;
        let mut current = cell.lock().await;
        let next = transition(&current)?;
        *current = next.clone();
        Ok(next)
    }

    // ==================== Referrals ====================

    async fn link_referral(
        &self,
        referrer: AccountId,
        referee: AccountId,
        bonus: u64,
        now: DateTime<Utc>,
    ) -> GameResult<ReferralOutcome> {
        if referrer == referee {
            return Err(GameError::SelfReferral);
        }

        let mut referrals = self.referrals.write().await;
        if referrals.contains_key(&(referrer, referee)) {
            return Ok(ReferralOutcome::AlreadyLinked);
        }

        let referrer_cell = self.progress_cell(referrer).await?;
        let referee_cell = self.progress_cell(referee).await?;

        // Lock in id order so that two opposite-direction links cannot deadlock
        let (low, high) = if referrer < referee {
            (&referrer_cell, &referee_cell)
        } else {
            (&referee_cell, &referrer_cell)
        };
        let mut low = low.lock().await;
        let mut high = high.lock().await;

        let low_next = low.credit(bonus)?;
        let high_next = high.credit(bonus)?;
        *low = low_next;
        *high = high_next;

        referrals.insert((referrer, referee), ReferralEdge::new(referrer, referee, now));
        Ok(ReferralOutcome::Linked)
    }

    async fn list_referrals(&self, referrer: AccountId) -> GameResult<Vec<ReferralEdge>> {
        let referrals = self.referrals.read().await;
        Ok(referrals
            .range((referrer, AccountId(0))..=(referrer, AccountId(u64::MAX)))
            .map(|(_, edge)| edge.clone())
            .collect())
    }

    // ==================== Ranking ====================

    async fn list_standings(&self) -> GameResult<Vec<(Account, Progress)>> {
        // Shared lock keeps half-applied referral grants out of the snapshot
        let _referrals = self.referrals.read().await;

        let accounts: Vec<Account> = self.accounts.read().await.values().cloned().collect();
        let cells: HashMap<AccountId, ProgressCell> = self.progress.read().await.clone();

        let mut standings = Vec::with_capacity(accounts.len());
        for account in accounts {
            if let Some(cell) = cells.get(&account.id) {
                let progress = cell.lock().await.clone();
                standings.push((account, progress));
            }
        }
        Ok(standings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_core::{BoosterKind, REFERRAL_BONUS};

    async fn create(store: &MemoryStore, platform_id: &str) -> Account {
        store
            .create_account(&PlatformIdentity::new(platform_id), Utc::now())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_account_crud() {
        let store = MemoryStore::new();

        let (account, progress) = store
            .create_account(&PlatformIdentity::new("42"), Utc::now())
            .await
            .unwrap();
        assert_eq!(progress.account_id, account.id);

        let found = store.find_account_by_platform_id("42").await.unwrap();
        assert_eq!(found, Some(account.clone()));
        assert!(store.find_account_by_platform_id("43").await.unwrap().is_none());

        let dup = store
            .create_account(&PlatformIdentity::new("42"), Utc::now())
            .await;
        assert!(matches!(dup, Err(GameError::Conflict(_))));

        store.clear().await;
        assert!(store.get_account(account.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_transition_leaves_record_untouched() {
        let store = MemoryStore::new();
        let account = create(&store, "42").await;

        let result = store
            .update_progress(
                account.id,
                Arc::new(|p: &Progress| p.purchase(BoosterKind::CoinsPerTap, 1)),
            )
            .await;
        assert!(matches!(result, Err(GameError::InsufficientFunds { .. })));

        let progress = store.get_progress(account.id).await.unwrap().unwrap();
        assert_eq!(progress.coins, 0);
        assert_eq!(progress.boosters.level(BoosterKind::CoinsPerTap), 0);
    }

    #[tokio::test]
    async fn test_update_missing_account() {
        let store = MemoryStore::new();
        let result = store
            .update_progress(AccountId(99), Arc::new(|p: &Progress| Ok(p.clone())))
            .await;
        assert!(matches!(result, Err(GameError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_link_referral_once() {
        let store = MemoryStore::new();
        let a = create(&store, "42").await;
        let b = create(&store, "43").await;

        let first = store
            .link_referral(a.id, b.id, REFERRAL_BONUS, Utc::now())
            .await
            .unwrap();
        let second = store
            .link_referral(a.id, b.id, REFERRAL_BONUS, Utc::now())
            .await
            .unwrap();
        assert_eq!(first, ReferralOutcome::Linked);
        assert_eq!(second, ReferralOutcome::AlreadyLinked);

        for id in [a.id, b.id] {
            let progress = store.get_progress(id).await.unwrap().unwrap();
            assert_eq!(progress.coins, REFERRAL_BONUS);
            assert_eq!(progress.total_earned, REFERRAL_BONUS);
        }

        let edges = store.list_referrals(a.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].referee_id, b.id);
        assert!(edges[0].bonus_granted);
        assert!(store.list_referrals(b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_referral_rejected() {
        let store = MemoryStore::new();
        let a = create(&store, "42").await;
        let result = store.link_referral(a.id, a.id, REFERRAL_BONUS, Utc::now()).await;
        assert!(matches!(result, Err(GameError::SelfReferral)));
    }

    #[tokio::test]
    async fn test_standings_include_every_account() {
        let store = MemoryStore::new();
        create(&store, "1").await;
        create(&store, "2").await;
        create(&store, "3").await;
        assert_eq!(store.list_standings().await.unwrap().len(), 3);
    }
}
