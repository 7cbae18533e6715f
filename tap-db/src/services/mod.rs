//! Game services
//!
//! Each service owns one slice of the game rules and talks to storage only
//! through the injected [`GameStore`]. Every store call is bounded by an
//! [`OperationTimeout`].

pub mod account_service;
pub mod progress_service;
pub mod ranking_service;
pub mod referral_service;

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::store::GameStore;
use tap_core::{Account, GameError, GameResult};

pub use account_service::{AccountService, LoginOutcome};
pub use progress_service::ProgressService;
pub use ranking_service::RankingService;
pub use referral_service::ReferralService;

/// Default bound on a single store operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on how long one store operation may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeout(Duration);

impl Default for OperationTimeout {
    fn default() -> Self {
        Self(DEFAULT_OPERATION_TIMEOUT)
    }
}

impl OperationTimeout {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    /// Run `fut`, failing with `GameError::Timeout` once the bound elapses
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> GameResult<T>
    where
        F: Future<Output = GameResult<T>>,
    {
        match tokio::time::timeout(self.0, fut).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.0.as_millis() as u64;
                warn!(operation, timeout_ms, "Store operation timed out");
                Err(GameError::Timeout(timeout_ms))
            }
        }
    }
}

/// Resolve a platform id to its account or fail with `NotFound`
pub(crate) async fn resolve_account(
    store: &dyn GameStore,
    timeout: OperationTimeout,
    platform_id: &str,
) -> GameResult<Account> {
    timeout
        .run("find_account", store.find_account_by_platform_id(platform_id))
        .await?
        .ok_or_else(|| GameError::NotFound(format!("User {} not found", platform_id)))
}
