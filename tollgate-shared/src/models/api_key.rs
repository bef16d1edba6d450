/// API key record
///
/// An API key is a scoped, revocable credential bound to one account. The
/// public `key_id` is the lookup handle; only a salted hash of the secret is
/// persisted, and the plaintext leaves the system exactly once at creation.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE api_keys (
///     id UUID PRIMARY KEY,
///     account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
///     key_id TEXT NOT NULL UNIQUE,
///     secret_hash TEXT NOT NULL,
///     name VARCHAR(255) NOT NULL,
///     scopes TEXT[] NOT NULL,
///     created_by UUID NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     expires_at TIMESTAMPTZ,
///     revoked_at TIMESTAMPTZ,
///     last_used_at TIMESTAMPTZ,
///     last_used_ip TEXT
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// API Key model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    /// Internal row id (used as `api_key_id` in audit entries)
    pub id: Uuid,

    /// Account this key belongs to
    pub account_id: Uuid,

    /// Public identifier presented before the `:` ("tg_...")
    pub key_id: String,

    /// `hex(salt)$hex(mac)`; never serialized
    #[serde(skip_serializing, default)]
    pub secret_hash: String,

    /// Human-readable name
    pub name: String,

    /// Granted scopes, matched exactly
    pub scopes: Vec<String>,

    /// User who issued the key
    pub created_by: Uuid,

    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_ip: Option<String>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Expired iff `expires_at` is at or before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Usable for authentication
    pub fn is_valid(&self) -> bool {
        !self.is_revoked() && !self.is_expired()
    }

    /// Exact scope membership; no wildcards or implication
    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes.iter().any(|scope| scope == required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(scopes: &[&str]) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            key_id: "tg_test".into(),
            secret_hash: "00$00".into(),
            name: "test".into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
            last_used_at: None,
            last_used_ip: None,
        }
    }

    #[test]
    fn test_scope_exactness() {
        let k = key(&["links:read"]);
        assert!(k.has_scope("links:read"));
        assert!(!k.has_scope("links:write"));
        assert!(!k.has_scope("links:*"));
        assert!(!k.has_scope("links"));
    }

    #[test]
    fn test_expiry() {
        let mut k = key(&["links:read"]);
        assert!(!k.is_expired());

        k.expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(k.is_expired());
        assert!(!k.is_valid());

        k.expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(k.is_valid());
    }

    #[test]
    fn test_hash_not_serialized() {
        let k = key(&["links:read"]);
        let json = serde_json::to_value(&k).unwrap();
        assert!(json.get("secret_hash").is_none());
        assert_eq!(json["key_id"], "tg_test");
    }
}
