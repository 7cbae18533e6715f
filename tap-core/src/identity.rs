//! Launch-payload (init data) verification
//!
//! The mini-app client receives a URL-encoded payload signed by the chat
//! platform. Verification:
//!
//! 1. Remove the `hash` pair.
//! 2. Sort the remaining pairs by key and join them as `key=value` lines.
//! 3. `secret = HMAC-SHA256(key = "WebAppData", data = shared_secret)`
//! 4. `expected = hex(HMAC-SHA256(key = secret, data = check_string))`
//! 5. Accept iff `expected == hash`, compared in constant time.
//!
//! On success the JSON `user` pair is decoded into a [`PlatformIdentity`].

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::VerificationError;
use crate::types::PlatformIdentity;

type HmacSha256 = Hmac<Sha256>;

const SECRET_KEY_LABEL: &[u8] = b"WebAppData";
const HASH_FIELD: &str = "hash";
const USER_FIELD: &str = "user";

/// Verifier bound to one shared secret (the bot token)
#[derive(Clone)]
pub struct InitDataVerifier {
    shared_secret: String,
}

impl std::fmt::Debug for InitDataVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitDataVerifier").finish_non_exhaustive()
    }
}

impl InitDataVerifier {
    pub fn new(shared_secret: impl Into<String>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
        }
    }

    /// Check the signature and extract the caller's identity
    pub fn verify(&self, raw: &str) -> Result<PlatformIdentity, VerificationError> {
        let mut pairs = parse_pairs(raw)?;

        let hash = pairs
            .iter()
            .find(|(k, _)| k == HASH_FIELD)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| VerificationError::MalformedPayload("missing hash".to_string()))?;
        pairs.retain(|(k, _)| k != HASH_FIELD);

        let expected = hex::decode(&hash).map_err(|_| VerificationError::InvalidSignature)?;
        let mac = check_mac(&self.shared_secret, &pairs)?;
        // verify_slice compares in constant time
        mac.verify_slice(&expected)
            .map_err(|_| VerificationError::InvalidSignature)?;

        extract_identity(&pairs)
    }

    /// Extract the identity without checking the signature.
    ///
    /// Only for explicitly flagged development mode.
    pub fn parse_unverified(&self, raw: &str) -> Result<PlatformIdentity, VerificationError> {
        extract_identity(&parse_pairs(raw)?)
    }
}

/// Contract-level entry point: verify `raw` against `shared_secret`
pub fn verify(raw: &str, shared_secret: &str) -> Result<PlatformIdentity, VerificationError> {
    InitDataVerifier::new(shared_secret).verify(raw)
}

/// Produce a signed payload from `pairs`, as the platform would.
///
/// Used by tests and local tooling to mint valid launch payloads.
pub fn sign_init_data(
    pairs: &[(&str, &str)],
    shared_secret: &str,
) -> Result<String, VerificationError> {
    let owned: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let hash = hex::encode(check_mac(shared_secret, &owned)?.finalize().into_bytes());

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.append_pair(HASH_FIELD, &hash);
    Ok(serializer.finish())
}

fn parse_pairs(raw: &str) -> Result<Vec<(String, String)>, VerificationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(VerificationError::MalformedPayload("empty init data".to_string()));
    }
    Ok(form_urlencoded::parse(raw.as_bytes()).into_owned().collect())
}

fn hmac(key: &[u8], data: &[u8]) -> Result<HmacSha256, VerificationError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| VerificationError::MalformedPayload(format!("bad hmac key: {}", e)))?;
    mac.update(data);
    Ok(mac)
}

fn check_mac(shared_secret: &str, pairs: &[(String, String)]) -> Result<HmacSha256, VerificationError> {
    let secret_key = hmac(SECRET_KEY_LABEL, shared_secret.as_bytes())?
        .finalize()
        .into_bytes();

    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let check_string = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n");

    hmac(&secret_key, check_string.as_bytes())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExternalId {
    Number(i64),
    Text(String),
}

#[derive(Deserialize)]
struct LaunchUser {
    id: ExternalId,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

fn extract_identity(pairs: &[(String, String)]) -> Result<PlatformIdentity, VerificationError> {
    let raw_user = pairs
        .iter()
        .find(|(k, _)| k == USER_FIELD)
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| VerificationError::MalformedPayload("no user data found".to_string()))?;

    let user: LaunchUser = serde_json::from_str(raw_user)
        .map_err(|e| VerificationError::MalformedPayload(format!("invalid user json: {}", e)))?;

    let external_id = match user.id {
        ExternalId::Number(n) => n.to_string(),
        ExternalId::Text(s) => s,
    };
    if external_id.trim().is_empty() {
        return Err(VerificationError::MalformedPayload("empty user id".to_string()));
    }

    Ok(PlatformIdentity {
        external_id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
    })
}
