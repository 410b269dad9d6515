//! Externalized session state.
//!
//! Sessions live in a shared key/value store keyed by a generated id, so any server
//! instance can serve any request. The browser only carries the id, signed with the
//! session secret.
//!
//! - [`SessionRecord`]: what is persisted per session
//! - [`SessionStore`]: load/save/destroy contract, with [`RedisSessionStore`] for
//!   deployments and [`MemorySessionStore`] for tests and local runs
//! - [`SessionManager`] and [`session_middleware`]: resolve the session for every
//!   request and write it back when it changed

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use uuid::Uuid;

pub mod layer;
pub mod memory;
pub mod redis_store;

pub use layer::{session_middleware, Session, SessionManager};
pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

/// Claim key holding the administrator flag.
pub const ADMIN_CLAIM: &str = "isAdmin";

/// The authenticated identity attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    /// Directory login name.
    pub login: String,
    pub display_name: String,
    pub is_admin: bool,
}

/// Persisted session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub principal: Option<Principal>,
    /// Password forwarded to the document backend on behalf of the principal.
    pub credential: Option<String>,
    pub claims: Map<String, Value>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: SessionId, ttl: Duration) -> Self {
        Self {
            id,
            principal: None,
            credential: None,
            claims: Map::new(),
            expires_at: expiry_after(ttl),
        }
    }
}

pub(crate) fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
    Utc::now() + ttl
}

/// Opaque session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts only ids this process could have generated.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Backend(String),
    #[error("session record could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SessionError> for crate::error::AppError {
    fn from(err: SessionError) -> Self {
        crate::error::AppError::Session(err.to_string())
    }
}

/// Shared store for session records. Expired records must read as absent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError>;
    /// Writes the record and (re)arms its time-to-live.
    async fn save(&self, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError>;
    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError>;
}

type HmacSha256 = Hmac<Sha256>;

/// Signs session ids for the cookie so clients cannot pick their own.
#[derive(Clone)]
pub struct CookieSigner {
    secret: Vec<u8>,
}

impl CookieSigner {
    pub fn new(secret: &str) -> Self {
        Self { secret: secret.as_bytes().to_vec() }
    }

    fn mac(&self, id: &SessionId) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(id.as_str().as_bytes());
        mac
    }

    /// `<id>.<hex signature>`
    pub fn sign(&self, id: &SessionId) -> String {
        let signature = hex::encode(self.mac(id).finalize().into_bytes());
        format!("{}.{}", id, signature)
    }

    /// Returns the id when the signature matches, `None` otherwise.
    pub fn verify(&self, value: &str) -> Option<SessionId> {
        let (raw_id, signature) = value.split_once('.')?;
        let id = SessionId::parse(raw_id)?;
        let signature = hex::decode(signature).ok()?;
        self.mac(&id).verify_slice(&signature).ok()?;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_cookie_roundtrip() {
        let signer = CookieSigner::new("secret");
        let id = SessionId::generate();
        let value = signer.sign(&id);
        assert_eq!(signer.verify(&value), Some(id));
    }

    #[test]
    fn test_tampered_cookie_rejected() {
        let signer = CookieSigner::new("secret");
        let id = SessionId::generate();
        let value = signer.sign(&id);

        let other = SessionId::generate();
        let (_, signature) = value.split_once('.').unwrap();
        assert_eq!(signer.verify(&format!("{}.{}", other, signature)), None);
        assert_eq!(CookieSigner::new("other-secret").verify(&value), None);
        assert_eq!(signer.verify(id.as_str()), None);
        assert_eq!(signer.verify("../etc/passwd.00"), None);
    }
}
