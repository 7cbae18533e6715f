//! Account types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal account identifier, assigned by the store at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl AccountId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Big-endian key bytes, so that key order matches id order
    pub fn to_key(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(raw)))
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity extracted from a launch payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformIdentity {
    /// External platform user id
    pub external_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl PlatformIdentity {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }
}

/// A registered player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// External identity, unique and immutable
    pub platform_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Account {
    /// Build a fresh account for a verified identity
    pub fn from_identity(id: AccountId, identity: &PlatformIdentity, now: DateTime<Utc>) -> Self {
        Self {
            id,
            platform_id: identity.external_id.clone(),
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Public name: username, falling back to first name
    pub fn display_name(&self) -> Option<String> {
        self.username.clone().or_else(|| self.first_name.clone())
    }

    /// Move `last_active_at` forward; never backwards
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_active_at {
            self.last_active_at = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_account_id_key_order() {
        let a = AccountId(1).to_key();
        let b = AccountId(256).to_key();
        assert!(a < b);
        assert_eq!(AccountId::from_key(&b), Some(AccountId(256)));
        assert_eq!(AccountId::from_key(&[1, 2, 3]), None);
    }

    #[test]
    fn test_display_name_fallback() {
        let now = Utc::now();
        let identity = PlatformIdentity::new("42").with_first_name("Ada");
        let account = Account::from_identity(AccountId(1), &identity, now);
        assert_eq!(account.display_name().as_deref(), Some("Ada"));

        let identity = identity.with_username("ada_l");
        let account = Account::from_identity(AccountId(1), &identity, now);
        assert_eq!(account.display_name().as_deref(), Some("ada_l"));
    }

    #[test]
    fn test_touch_is_monotonic() {
        let now = Utc::now();
        let mut account = Account::from_identity(AccountId(1), &PlatformIdentity::new("42"), now);

        account.touch(now - Duration::minutes(5));
        assert_eq!(account.last_active_at, now);

        let later = now + Duration::minutes(5);
        account.touch(later);
        assert_eq!(account.last_active_at, later);
    }
}
