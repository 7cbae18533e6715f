//! Application state for the API server

use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::config::ServerConfig;
use tap_core::InitDataVerifier;
use tap_db::{
    AccountService, GameStore, OperationTimeout, ProgressService, RankingService, ReferralService,
};

/// API server state
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub progress: Arc<ProgressService>,
    pub referrals: Arc<ReferralService>,
    pub ranking: Arc<RankingService>,
    pub verifier: Arc<InitDataVerifier>,
    pub tokens: Arc<TokenIssuer>,
    /// Kept for readiness checks
    pub store: Arc<dyn GameStore>,
    /// Accept launch data that fails verification
    pub dev_mode: bool,
    pub version: String,
}

impl AppState {
    pub fn new(store: Arc<dyn GameStore>, config: &ServerConfig) -> Self {
        let timeout: OperationTimeout = config.operation_timeout();

        Self {
            accounts: Arc::new(AccountService::new(store.clone(), timeout)),
            progress: Arc::new(ProgressService::new(store.clone(), timeout)),
            referrals: Arc::new(ReferralService::new(store.clone(), timeout)),
            ranking: Arc::new(RankingService::new(store.clone(), timeout)),
            verifier: Arc::new(InitDataVerifier::new(config.bot_token.clone())),
            tokens: Arc::new(TokenIssuer::new(&config.jwt_secret)),
            store,
            dev_mode: config.dev_mode,
            version: crate::VERSION.to_string(),
        }
    }
}
