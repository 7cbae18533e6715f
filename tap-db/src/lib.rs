//! Tap DB - storage and game services
//!
//! Provides the persistence layer and the services that apply the game
//! rules from `tap-core` atomically.
//!
//! # Architecture
//!
//! - [`GameStore`] - storage interface; every conditional read-modify-write
//!   happens inside a single store call
//! - [`MemoryStore`] - in-memory implementation for tests and development
//! - [`SledStore`] - embedded persistent implementation
//! - Services - `AccountService`, `ProgressService`, `ReferralService`,
//!   `RankingService`, each built from an injected `Arc<dyn GameStore>`
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tap_db::{MemoryStore, OperationTimeout, ProgressService};
//!
//! let store = Arc::new(MemoryStore::new());
//! let progress = ProgressService::new(store, OperationTimeout::new(Duration::from_secs(5)));
//! ```

pub mod services;
pub mod store;

pub use services::{
    AccountService, LoginOutcome, OperationTimeout, ProgressService, RankingService,
    ReferralService,
};
pub use store::{
    open_store, GameStore, MemoryStore, ProgressTransition, SledStore, StoreConfig,
    MEMORY_STORE_URL,
};
