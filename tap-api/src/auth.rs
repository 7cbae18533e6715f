//! Login tokens
//!
//! HS256 JWTs bound to the internal account id.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use tap_core::{Account, AccountId};

/// Token lifetime
pub const TOKEN_TTL_DAYS: i64 = 7;

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Internal account id
    pub sub: String,
    pub platform_id: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl TokenClaims {
    pub fn account_id(&self) -> Option<AccountId> {
        self.sub.parse().ok().map(AccountId::new)
    }
}

/// Signs and checks login tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(TOKEN_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self, account: &Account) -> ApiResult<String> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: account.id.to_string(),
            platform_id: account.platform_id.clone(),
            iat: now.timestamp().max(0) as u64,
            exp: (now + self.ttl).timestamp().max(0) as u64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))
    }

    /// Decode `token`, rejecting bad signatures and expired tokens
    pub fn verify(&self, token: &str) -> ApiResult<TokenClaims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthorized("Token has expired".to_string())
                }
                _ => ApiError::Unauthorized(format!("Invalid token: {}", e)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_core::PlatformIdentity;

    fn account() -> Account {
        Account::from_identity(AccountId::new(7), &PlatformIdentity::new("42"), Utc::now())
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = TokenIssuer::new("test-secret");
        let token = issuer.issue(&account()).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.account_id(), Some(AccountId::new(7)));
        assert_eq!(claims.platform_id, "42");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = TokenIssuer::new("secret-a").issue(&account()).unwrap();
        assert!(matches!(
            TokenIssuer::new("secret-b").verify(&token),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = TokenIssuer::new("test-secret").with_ttl(Duration::hours(-1));
        let token = issuer.issue(&account()).unwrap();
        assert!(issuer.verify(&token).is_err());
    }
}
