//! Account Service
//!
//! Maps platform identities to accounts and handles first-login creation.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{resolve_account, OperationTimeout};
use crate::store::GameStore;
use tap_core::{Account, AccountId, GameError, GameResult, PlatformIdentity, Progress};

/// Result of a login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account: Account,
    pub progress: Progress,
    /// True when this login registered the account
    pub created: bool,
}

/// Account Service
pub struct AccountService {
    store: Arc<dyn GameStore>,
    timeout: OperationTimeout,
}

impl AccountService {
    pub fn new(store: Arc<dyn GameStore>, timeout: OperationTimeout) -> Self {
        Self { store, timeout }
    }

    pub async fn find_by_platform_id(&self, platform_id: &str) -> GameResult<Account> {
        resolve_account(self.store.as_ref(), self.timeout, platform_id).await
    }

    /// Create the account and its default progress as one unit
    pub async fn create_account(&self, identity: &PlatformIdentity) -> GameResult<(Account, Progress)> {
        self.timeout
            .run("create_account", self.store.create_account(identity, Utc::now()))
            .await
    }

    /// Record activity without blocking the caller.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn touch_last_active(&self, id: AccountId) {
        let store = self.store.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let result = timeout
                .run("touch_last_active", store.touch_last_active(id, Utc::now()))
                .await;
            if let Err(e) = result {
                warn!(account_id = %id, error = %e, "Failed to update last active time");
            }
        });
    }

    /// Find or create the account for a verified identity.
    ///
    /// Concurrent first logins for the same identity resolve to a single
    /// account: the loser of the creation race reads the winner's record.
    pub async fn login(&self, identity: &PlatformIdentity) -> GameResult<LoginOutcome> {
        let existing = self
            .timeout
            .run(
                "find_account",
                self.store.find_account_by_platform_id(&identity.external_id),
            )
            .await?;

        if let Some(account) = existing {
            return self.existing_login(account).await;
        }

        match self.create_account(identity).await {
            Ok((account, progress)) => {
                info!(
                    platform_id = %account.platform_id,
                    account_id = %account.id,
                    "Registered new account"
                );
                Ok(LoginOutcome {
                    account,
                    progress,
                    created: true,
                })
            }
            Err(GameError::Conflict(_)) => {
                debug!(platform_id = %identity.external_id, "Lost account creation race");
                let account = self.find_by_platform_id(&identity.external_id).await?;
                self.existing_login(account).await
            }
            Err(e) => Err(e),
        }
    }

    async fn existing_login(&self, mut account: Account) -> GameResult<LoginOutcome> {
        self.touch_last_active(account.id);
        account.touch(Utc::now());

        let progress = self
            .timeout
            .run("get_progress", self.store.get_progress(account.id))
            .await?
            .ok_or_else(|| {
                GameError::NotFound(format!("Progress for account {} not found", account.id))
            })?;

        Ok(LoginOutcome {
            account,
            progress,
            created: false,
        })
    }
}
