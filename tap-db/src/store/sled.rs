//! Sled persistent store
//!
//! Accounts, the platform-id index, progress and referral edges live in
//! separate trees. Multi-record transitions run as sled transactions over
//! the trees they touch, so they commit as a unit.
//!
//! sled calls block, so every trait method runs its body on tokio's blocking
//! pool. Readers that span several progress rows take the read side of
//! `gate`; referral linking takes the write side, so a scan never sees one
//! party credited and the other not.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::Transactional;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{GameStore, ProgressTransition, StoreConfig};
use tap_core::{
    Account, AccountId, Boosters, GameError, GameResult, PlatformIdentity, Progress,
    ReferralEdge, ReferralOutcome,
};

/// Tree names
const ACCOUNTS_TREE: &str = "accounts";
const PLATFORM_INDEX_TREE: &str = "platform_index";
const PROGRESS_TREE: &str = "progress";
const REFERRALS_TREE: &str = "referrals";

type TxResult<T> = ConflictableTransactionResult<T, GameError>;

/// Sled-backed game store
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    accounts: sled::Tree,
    platform_index: sled::Tree,
    progress: sled::Tree,
    referrals: sled::Tree,
    gate: Arc<RwLock<()>>,
}

/// Persisted progress row; boosters are kept as a serialized mapping
#[derive(Debug, Serialize, Deserialize)]
struct ProgressRecord {
    account_id: AccountId,
    coins: u64,
    energy: u64,
    max_energy: u64,
    coins_per_tap: u64,
    energy_regen_rate_ms: u64,
    total_earned: u64,
    total_taps: u64,
    boosters: String,
    last_saved_at: DateTime<Utc>,
}

impl ProgressRecord {
    fn from_progress(progress: &Progress) -> GameResult<Self> {
        Ok(Self {
            account_id: progress.account_id,
            coins: progress.coins,
            energy: progress.energy,
            max_energy: progress.max_energy,
            coins_per_tap: progress.coins_per_tap,
            energy_regen_rate_ms: progress.energy_regen_rate_ms,
            total_earned: progress.total_earned,
            total_taps: progress.total_taps,
            boosters: progress.boosters.to_json()?,
            last_saved_at: progress.last_saved_at,
        })
    }

    fn into_progress(self) -> GameResult<Progress> {
        Ok(Progress {
            account_id: self.account_id,
            coins: self.coins,
            energy: self.energy,
            max_energy: self.max_energy,
            coins_per_tap: self.coins_per_tap,
            energy_regen_rate_ms: self.energy_regen_rate_ms,
            total_earned: self.total_earned,
            total_taps: self.total_taps,
            boosters: Boosters::from_json(&self.boosters)?,
            last_saved_at: self.last_saved_at,
        })
    }
}

impl SledStore {
    /// Open using `config`
    pub fn new(config: &StoreConfig) -> GameResult<Self> {
        let db = sled::Config::new()
            .path(&config.data_dir)
            .cache_capacity(config.cache_capacity)
            .flush_every_ms(config.flush_every_ms)
            .open()
            .map_err(|e| storage_err("open sled db", e))?;
        Self::from_db(db)
    }

    /// Open or create a database at `path` with default settings
    pub fn open<P: AsRef<Path>>(path: P) -> GameResult<Self> {
        let db = sled::open(path).map_err(|e| storage_err("open sled db", e))?;
        Self::from_db(db)
    }

    /// Throwaway database, removed on drop
    pub fn temporary() -> GameResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| storage_err("open temporary sled db", e))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> GameResult<Self> {
        let open_tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| storage_err(&format!("open {} tree", name), e))
        };

        Ok(Self {
            accounts: open_tree(ACCOUNTS_TREE)?,
            platform_index: open_tree(PLATFORM_INDEX_TREE)?,
            progress: open_tree(PROGRESS_TREE)?,
            referrals: open_tree(REFERRALS_TREE)?,
            gate: Arc::new(RwLock::new(())),
            db,
        })
    }

    /// Flush to disk
    pub fn flush(&self) -> GameResult<()> {
        self.db.flush().map_err(|e| storage_err("flush db", e))?;
        Ok(())
    }

    // ==================== Helpers ====================

    /// Run `body` against a clone of this store on the blocking pool
    async fn blocking<T, F>(&self, operation: &'static str, body: F) -> GameResult<T>
    where
        T: Send + 'static,
        F: FnOnce(SledStore) -> GameResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || body(store))
            .await
            .map_err(|e| GameError::Internal(format!("sled {} task failed: {}", operation, e)))?
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn encode<T: Serialize>(value: &T) -> GameResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> GameResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_progress(progress: &Progress) -> GameResult<Vec<u8>> {
        Self::encode(&ProgressRecord::from_progress(progress)?)
    }

    fn decode_progress(bytes: &[u8]) -> GameResult<Progress> {
        Self::decode::<ProgressRecord>(bytes)?.into_progress()
    }

    // ==================== Blocking bodies ====================

    fn read_account(&self, id: AccountId) -> GameResult<Option<Account>> {
        match self
            .accounts
            .get(id.to_key())
            .map_err(|e| storage_err("get account", e))?
        {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_account_by_platform_id(&self, platform_id: &str) -> GameResult<Option<Account>> {
        let id_bytes = match self
            .platform_index
            .get(platform_id.as_bytes())
            .map_err(|e| storage_err("get platform index", e))?
        {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let id = AccountId::from_key(&id_bytes).ok_or_else(|| {
            GameError::Serialization(format!("Corrupt index entry for platform id {}", platform_id))
        })?;
        self.read_account(id)
    }

    fn insert_account(
        &self,
        identity: &PlatformIdentity,
        now: DateTime<Utc>,
    ) -> GameResult<(Account, Progress)> {
        let id = AccountId(
            self.db
                .generate_id()
                .map_err(|e| storage_err("generate account id", e))?
                + 1,
        );
        let account = Account::from_identity(id, identity, now);
        let progress = Progress::new_default(id, now);

        let key = id.to_key();
        let platform_key = identity.external_id.as_bytes();
        let account_bytes = Self::encode(&account)?;
        let progress_bytes = Self::encode_progress(&progress)?;

        (&self.accounts, &self.platform_index, &self.progress)
            .transaction(|(accounts, index, progress_tree)| -> TxResult<()> {
                if index.get(platform_key)?.is_some() {
                    return abort(GameError::Conflict(format!(
                        "Account for platform id {} already exists",
                        identity.external_id
                    )));
                }
                accounts.insert(&key[..], account_bytes.clone())?;
                progress_tree.insert(&key[..], progress_bytes.clone())?;
                index.insert(platform_key, &key[..])?;
                Ok(())
            })
            .map_err(map_tx_error)?;

        Ok((account, progress))
    }

    fn touch_account(&self, id: AccountId, at: DateTime<Utc>) -> GameResult<()> {
        let key = id.to_key();
        self.accounts
            .transaction(|tx| -> TxResult<()> {
                let bytes = match tx.get(&key[..])? {
                    Some(bytes) => bytes,
                    None => return abort(GameError::NotFound(format!("Account {} not found", id))),
                };
                let mut account: Account =
                    Self::decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
                account.touch(at);
                let bytes = Self::encode(&account).map_err(ConflictableTransactionError::Abort)?;
                tx.insert(&key[..], bytes)?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    fn read_progress(&self, id: AccountId) -> GameResult<Option<Progress>> {
        match self
            .progress
            .get(id.to_key())
            .map_err(|e| storage_err("get progress", e))?
        {
            Some(bytes) => Ok(Some(Self::decode_progress(&bytes)?)),
            None => Ok(None),
        }
    }

    fn transition_progress(
        &self,
        id: AccountId,
        transition: &ProgressTransition,
    ) -> GameResult<Progress> {
        let key = id.to_key();
        self.progress
            .transaction(|tx| -> TxResult<Progress> {
                let bytes = match tx.get(&key[..])? {
                    Some(bytes) => bytes,
                    None => {
                        return abort(GameError::NotFound(format!(
                            "Progress for account {} not found",
                            id
                        )))
                    }
                };
                let current =
                    Self::decode_progress(&bytes).map_err(ConflictableTransactionError::Abort)?;
                let next = transition(&current).map_err(ConflictableTransactionError::Abort)?;
                let encoded =
                    Self::encode_progress(&next).map_err(ConflictableTransactionError::Abort)?;
                tx.insert(&key[..], encoded)?;
                Ok(next)
            })
            .map_err(map_tx_error)
    }

    fn insert_referral(
        &self,
        referrer: AccountId,
        referee: AccountId,
        bonus: u64,
        now: DateTime<Utc>,
    ) -> GameResult<ReferralOutcome> {
        let edge_key = ReferralEdge::key(referrer, referee);
        let edge_bytes = Self::encode(&ReferralEdge::new(referrer, referee, now))?;

        let _gate = self.write_gate();
        (&self.referrals, &self.progress)
            .transaction(|(referrals, progress)| -> TxResult<ReferralOutcome> {
                if referrals.get(&edge_key[..])?.is_some() {
                    return Ok(ReferralOutcome::AlreadyLinked);
                }

                for id in [referrer, referee] {
                    let key = id.to_key();
                    let bytes = match progress.get(&key[..])? {
                        Some(bytes) => bytes,
                        None => {
                            return abort(GameError::NotFound(format!(
                                "Progress for account {} not found",
                                id
                            )))
                        }
                    };
                    let credited = Self::decode_progress(&bytes)
                        .and_then(|p| p.credit(bonus))
                        .and_then(|p| Self::encode_progress(&p))
                        .map_err(ConflictableTransactionError::Abort)?;
                    progress.insert(&key[..], credited)?;
                }

                referrals.insert(&edge_key[..], edge_bytes.clone())?;
                Ok(ReferralOutcome::Linked)
            })
            .map_err(map_tx_error)
    }

    fn scan_referrals(&self, referrer: AccountId) -> GameResult<Vec<ReferralEdge>> {
        let _gate = self.read_gate();
        let mut edges = Vec::new();
        for item in self.referrals.scan_prefix(referrer.to_key()) {
            let (_, value) = item.map_err(|e| storage_err("iterate referrals", e))?;
            edges.push(Self::decode(&value)?);
        }
        Ok(edges)
    }

    fn scan_standings(&self) -> GameResult<Vec<(Account, Progress)>> {
        let _gate = self.read_gate();
        let mut standings = Vec::new();
        for item in self.accounts.iter() {
            let (key, value) = item.map_err(|e| storage_err("iterate accounts", e))?;
            let account: Account = Self::decode(&value)?;
            if let Some(bytes) = self
                .progress
                .get(&key)
                .map_err(|e| storage_err("get progress", e))?
            {
                standings.push((account, Self::decode_progress(&bytes)?));
            }
        }
        Ok(standings)
    }
}

fn storage_err(action: &str, e: sled::Error) -> GameError {
    GameError::StoreUnavailable(format!("Failed to {}: {}", action, e))
}

fn abort<T>(e: GameError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(e))
}

fn map_tx_error(e: TransactionError<GameError>) -> GameError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => storage_err("commit transaction", e),
    }
}

#[async_trait]
impl GameStore for SledStore {
    fn backend_name(&self) -> &'static str {
        "sled"
    }

    async fn ping(&self) -> GameResult<()> {
        self.blocking("ping", |store| {
            store
                .db
                .size_on_disk()
                .map_err(|e| storage_err("check db", e))?;
            Ok(())
        })
        .await
    }

    // ==================== Accounts ====================

    async fn get_account(&self, id: AccountId) -> GameResult<Option<Account>> {
        self.blocking("get_account", move |store| store.read_account(id))
            .await
    }

    async fn find_account_by_platform_id(&self, platform_id: &str) -> GameResult<Option<Account>> {
        let platform_id = platform_id.to_string();
        self.blocking("find_account", move |store| {
            store.read_account_by_platform_id(&platform_id)
        })
        .await
    }

    async fn create_account(
        &self,
        identity: &PlatformIdentity,
        now: DateTime<Utc>,
    ) -> GameResult<(Account, Progress)> {
        let identity = identity.clone();
        self.blocking("create_account", move |store| {
            store.insert_account(&identity, now)
        })
        .await
    }

    async fn touch_last_active(&self, id: AccountId, at: DateTime<Utc>) -> GameResult<()> {
        self.blocking("touch_last_active", move |store| store.touch_account(id, at))
            .await
    }

    // ==================== Progress ====================

    async fn get_progress(&self, id: AccountId) -> GameResult<Option<Progress>> {
        self.blocking("get_progress", move |store| store.read_progress(id))
            .await
    }

    async fn update_progress(
        &self,
        id: AccountId,
        transition: ProgressTransition,
    ) -> GameResult<Progress> {
        self.blocking("update_progress", move |store| {
            store.transition_progress(id, &transition)
        })
        .await
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
        self.blocking("link_referral", move |store| {
            store.insert_referral(referrer, referee, bonus, now)
        })
        .await
    }

    async fn list_referrals(&self, referrer: AccountId) -> GameResult<Vec<ReferralEdge>> {
        self.blocking("list_referrals", move |store| store.scan_referrals(referrer))
            .await
    }

    // ==================== Ranking ====================

    async fn list_standings(&self) -> GameResult<Vec<(Account, Progress)>> {
        self.blocking("list_standings", |store| store.scan_standings())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::OperationTimeout;
    use tap_core::{BoosterKind, REFERRAL_BONUS};

    #[tokio::test]
    async fn test_account_and_progress_created_together() {
        let store = SledStore::temporary().unwrap();

        let (account, progress) = store
            .create_account(&PlatformIdentity::new("42").with_username("ada"), Utc::now())
            .await
            .unwrap();
        assert_eq!(progress.coins, 0);

        let found = store.find_account_by_platform_id("42").await.unwrap().unwrap();
        assert_eq!(found.id, account.id);
        assert_eq!(found.username.as_deref(), Some("ada"));
        assert!(store.get_progress(account.id).await.unwrap().is_some());

        let dup = store
            .create_account(&PlatformIdentity::new("42"), Utc::now())
            .await;
        assert!(matches!(dup, Err(GameError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_boosters_stored_as_serialized_mapping() {
        let store = SledStore::temporary().unwrap();
        let (account, _) = store
            .create_account(&PlatformIdentity::new("42"), Utc::now())
            .await
            .unwrap();

        store
            .update_progress(
                account.id,
                Arc::new(|p: &Progress| -> GameResult<Progress> {
                    let mut next = p.credit(300)?;
                    next = next.purchase(BoosterKind::EnergyRegen, 100)?;
                    Ok(next)
                }),
            )
            .await
            .unwrap();

        let raw = store.progress.get(account.id.to_key()).unwrap().unwrap();
        let row: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        let boosters: serde_json::Value =
            serde_json::from_str(row["boosters"].as_str().unwrap()).unwrap();
        assert_eq!(boosters["energyRegen"], 1);
        assert_eq!(boosters["coinsPerTap"], 0);
    }

    #[tokio::test]
    async fn test_referral_transaction() {
        let store = SledStore::temporary().unwrap();
        let (a, _) = store
            .create_account(&PlatformIdentity::new("42"), Utc::now())
            .await
            .unwrap();
        let (b, _) = store
            .create_account(&PlatformIdentity::new("43"), Utc::now())
            .await
            .unwrap();

        let outcome = store
            .link_referral(a.id, b.id, REFERRAL_BONUS, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, ReferralOutcome::Linked);
        let outcome = store
            .link_referral(a.id, b.id, REFERRAL_BONUS, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, ReferralOutcome::AlreadyLinked);

        assert_eq!(store.get_progress(a.id).await.unwrap().unwrap().coins, 500);
        assert_eq!(store.get_progress(b.id).await.unwrap().unwrap().coins, 500);
        assert_eq!(store.list_referrals(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_referral_to_missing_account_changes_nothing() {
        let store = SledStore::temporary().unwrap();
        let (a, _) = store
            .create_account(&PlatformIdentity::new("42"), Utc::now())
            .await
            .unwrap();

        let result = store
            .link_referral(a.id, AccountId(999), REFERRAL_BONUS, Utc::now())
            .await;
        assert!(matches!(result, Err(GameError::NotFound(_))));
        assert_eq!(store.get_progress(a.id).await.unwrap().unwrap().coins, 0);
        assert!(store.list_referrals(a.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let account_id = {
            let store = SledStore::open(dir.path()).unwrap();
            let (account, _) = store
                .create_account(&PlatformIdentity::new("42"), Utc::now())
                .await
                .unwrap();
            store.flush().unwrap();
            account.id
        };

        let store = SledStore::open(dir.path()).unwrap();
        let account = store.find_account_by_platform_id("42").await.unwrap().unwrap();
        assert_eq!(account.id, account_id);
        assert_eq!(store.list_standings().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stuck_call_surfaces_timeout() {
        let store = SledStore::temporary().unwrap();
        let gate = store.gate.clone();
        let held = gate.write().unwrap();

        let result = OperationTimeout::from_millis(20)
            .run("list_standings", store.list_standings())
            .await;
        assert!(matches!(result, Err(GameError::Timeout(20))));

        drop(held);
        assert!(store.list_standings().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_standings_never_show_half_credited_referral() {
        let store = SledStore::temporary().unwrap();
        let mut pairs = Vec::new();
        for i in 0..20 {
            let (a, _) = store
                .create_account(&PlatformIdentity::new(format!("a{}", i)), Utc::now())
                .await
                .unwrap();
            let (b, _) = store
                .create_account(&PlatformIdentity::new(format!("b{}", i)), Utc::now())
                .await
                .unwrap();
            pairs.push((a.id, b.id));
        }

        let writer = {
            let store = store.clone();
            let pairs = pairs.clone();
            tokio::spawn(async move {
                for (a, b) in pairs {
                    store.link_referral(a, b, REFERRAL_BONUS, Utc::now()).await.unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let coins: std::collections::HashMap<AccountId, u64> = store
                .list_standings()
                .await
                .unwrap()
                .into_iter()
                .map(|(account, progress)| (account.id, progress.coins))
                .collect();
            for (a, b) in &pairs {
                assert_eq!(coins[a], coins[b], "pair {} / {} seen half credited", a, b);
            }
        }
        writer.await.unwrap();
    }
}
