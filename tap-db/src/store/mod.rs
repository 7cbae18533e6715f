//! Game storage layer
//!
//! Every operation that checks a condition and then mutates (account
//! creation, progress updates, referral linking) is a single call on this
//! trait, so implementations can make it atomic: either the whole
//! transition commits or nothing does.

pub mod memory;
pub mod sled;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use tap_core::{
    Account, AccountId, GameResult, PlatformIdentity, Progress, ReferralEdge, ReferralOutcome,
};

/// Closure applied to the stored progress inside an atomic update.
///
/// May be invoked more than once by optimistic backends, so it must be pure.
/// Owned so blocking backends can move it onto a worker thread.
pub type ProgressTransition = Arc<dyn Fn(&Progress) -> GameResult<Progress> + Send + Sync>;

/// Storage interface for accounts, progress and referrals
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Backend name, for logs and health output
    fn backend_name(&self) -> &'static str;

    /// Cheap liveness check
    async fn ping(&self) -> GameResult<()>;

    // ==================== Accounts ====================

    async fn get_account(&self, id: AccountId) -> GameResult<Option<Account>>;

    async fn find_account_by_platform_id(&self, platform_id: &str) -> GameResult<Option<Account>>;

    /// Create an account and its default progress as one unit.
    ///
    /// Fails with `Conflict` when the platform id is already registered.
    async fn create_account(
        &self,
        identity: &PlatformIdentity,
        now: DateTime<Utc>,
    ) -> GameResult<(Account, Progress)>;

    /// Move `last_active_at` forward
    async fn touch_last_active(&self, id: AccountId, at: DateTime<Utc>) -> GameResult<()>;

    // ==================== Progress ====================

    async fn get_progress(&self, id: AccountId) -> GameResult<Option<Progress>>;

    /// Atomically replace the stored progress with `transition(current)`.
    ///
    /// Concurrent updates of the same account are serialized; an error
    /// from `transition` leaves the record untouched.
    async fn update_progress(
        &self,
        id: AccountId,
        transition: ProgressTransition,
    ) -> GameResult<Progress>;

    // ==================== Referrals ====================

    /// Record `referrer -> referee` and credit `bonus` to both accounts in
    /// the same unit. An existing edge is left untouched.
    async fn link_referral(
        &self,
        referrer: AccountId,
        referee: AccountId,
        bonus: u64,
        now: DateTime<Utc>,
    ) -> GameResult<ReferralOutcome>;

    /// Edges whose referrer is `referrer`, in referee id order
    async fn list_referrals(&self, referrer: AccountId) -> GameResult<Vec<ReferralEdge>>;

    // ==================== Ranking ====================

    /// Every account that has a progress record
    async fn list_standings(&self) -> GameResult<Vec<(Account, Progress)>>;
}

/// URL that selects the in-memory store
pub const MEMORY_STORE_URL: &str = "mem://";

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Data directory, or `mem://`
    pub data_dir: String,
    /// Page cache size in bytes
    pub cache_capacity: u64,
    /// Background flush interval
    pub flush_every_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "./tap_data".to_string(),
            cache_capacity: 64 * 1024 * 1024, // 64MB
            flush_every_ms: Some(500),
        }
    }
}

impl StoreConfig {
    pub fn with_data_dir(data_dir: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// In-memory configuration for tests
    pub fn test() -> Self {
        Self {
            data_dir: MEMORY_STORE_URL.to_string(),
            cache_capacity: 4 * 1024 * 1024, // 4MB
            flush_every_ms: None,
        }
    }

    pub fn is_memory(&self) -> bool {
        self.data_dir == MEMORY_STORE_URL || self.data_dir.is_empty()
    }
}

/// Open the store selected by `config`
pub fn open_store(config: &StoreConfig) -> GameResult<Arc<dyn GameStore>> {
    if config.is_memory() {
        tracing::info!("Using in-memory game store");
        Ok(Arc::new(MemoryStore::new()))
    } else {
        tracing::info!(data_dir = %config.data_dir, "Opening sled game store");
        Ok(Arc::new(SledStore::new(config)?))
    }
}

pub use memory::MemoryStore;
pub use self::sled::SledStore;
