//! Error types for the game core

use thiserror::Error;

use crate::types::BoosterKind;

/// Launch-payload verification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Invalid init data signature")]
    InvalidSignature,

    #[error("Malformed init data: {0}")]
    MalformedPayload(String),
}

/// Game operation errors
#[derive(Error, Debug)]
pub enum GameError {
    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Booster {kind} is already at max level {max}")]
    MaxLevelReached { kind: BoosterKind, max: u32 },

    #[error("An account cannot refer itself")]
    SelfReferral,

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GameError {
    /// Stable machine-readable identifier
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::Verification(VerificationError::InvalidSignature) => "INVALID_SIGNATURE",
            GameError::Verification(VerificationError::MalformedPayload(_)) => "MALFORMED_PAYLOAD",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Conflict(_) => "CONFLICT",
            GameError::InvalidState(_) => "INVALID_STATE",
            GameError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            GameError::MaxLevelReached { .. } => "MAX_LEVEL_REACHED",
            GameError::SelfReferral => "SELF_REFERRAL",
            GameError::Timeout(_) => "TIMEOUT",
            GameError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            GameError::Serialization(_) => "SERIALIZATION_ERROR",
            GameError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the same request with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, GameError::Timeout(_) | GameError::StoreUnavailable(_))
    }

    /// Whether the error was caused by the caller's input
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            GameError::Verification(_)
                | GameError::NotFound(_)
                | GameError::InvalidState(_)
                | GameError::InsufficientFunds { .. }
                | GameError::MaxLevelReached { .. }
                | GameError::SelfReferral
        )
    }
}

impl From<serde_json::Error> for GameError {
    fn from(e: serde_json::Error) -> Self {
        GameError::Serialization(e.to_string())
    }
}

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;
