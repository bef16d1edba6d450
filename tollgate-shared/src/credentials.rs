/// API key lifecycle
///
/// [`CredentialStore`] issues, validates, revokes and regenerates API keys.
/// The plaintext secret exists only in the [`IssuedKey`] returned from
/// `create`/`regenerate`; it is never stored or logged.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tollgate_shared::credentials::{CredentialStore, NewApiKey};
/// use tollgate_shared::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), tollgate_shared::GateError> {
/// let credentials = CredentialStore::new(Arc::new(MemoryStore::new()));
/// let issued = credentials
///     .create(Uuid::new_v4(), Uuid::new_v4(), NewApiKey {
///         name: "CI".into(),
///         scopes: vec!["links:read".into()],
///         expires_at: None,
///     })
///     .await?;
///
/// let key = credentials.validate(&issued.credential(), None).await?;
/// assert!(key.is_some());
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::api_key::{self, find_unknown_scope};
use crate::error::{GateError, GateResult};
use crate::models::api_key::ApiKey;
use crate::models::member::AccountRole;
use crate::store::Store;

const MAX_NAME_LENGTH: usize = 255;

/// Verified against when the key id is unknown so lookups cost the same
const DUMMY_HASH: &str = "00000000000000000000000000000000$\
                          0000000000000000000000000000000000000000000000000000000000000000";

/// Input validation failures for key creation
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("API key name is required")]
    EmptyName,

    #[error("API key name must be at most 255 characters")]
    NameTooLong,

    #[error("At least one scope is required")]
    NoScopes,

    #[error("Unknown scope: {0}")]
    UnknownScope(String),

    #[error("Expiry must be in the future")]
    ExpiryInPast,

    #[error("Expired keys cannot be regenerated; create a new key")]
    Expired,
}

impl From<CredentialError> for GateError {
    fn from(err: CredentialError) -> Self {
        GateError::Validation(err.to_string())
    }
}

/// Input for issuing a key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewApiKey {
    pub name: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A freshly issued key and its one-time plaintext secret
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub record: ApiKey,
    pub secret: String,
}

impl IssuedKey {
    /// The full `key_id:secret` string to hand to the client
    pub fn credential(&self) -> String {
        format!("{}:{}", self.record.key_id, self.secret)
    }
}

/// API key service over a [`Store`]
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn Store>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Issues a new key
    ///
    /// # Errors
    ///
    /// `Validation` for a blank name, no scopes, scopes outside the catalog,
    /// or an expiry that already passed.
    pub async fn create(
        &self,
        account_id: Uuid,
        actor_id: Uuid,
        input: NewApiKey,
    ) -> GateResult<IssuedKey> {
        let name = validate_name(&input.name)?;
        validate_scopes(&input.scopes)?;

        if let Some(expires_at) = input.expires_at {
            if expires_at <= Utc::now() {
                return Err(CredentialError::ExpiryInPast.into());
            }
        }

        let (record, secret) = build_key(account_id, actor_id, name, input.scopes, input.expires_at);
        let record = self.store.insert_api_key(record).await?;

        info!(
            account_id = %account_id,
            key_id = %record.key_id,
            scopes = ?record.scopes,
            "API key created"
        );

        Ok(IssuedKey { record, secret })
    }

    /// Resolves a presented `key_id:secret` to its record
    ///
    /// Returns `None` for malformed input, unknown ids, revoked or expired
    /// keys and secret mismatches alike. On success the usage timestamp is
    /// updated in the background.
    pub async fn validate(
        &self,
        presented: &str,
        source_ip: Option<String>,
    ) -> GateResult<Option<ApiKey>> {
        let Some((key_id, secret)) = api_key::parse_credential(presented) else {
            return Ok(None);
        };

        let record = if api_key::is_valid_key_id(key_id) {
            self.store.get_api_key(key_id).await?
        } else {
            None
        };

        let Some(record) = record else {
            let _ = api_key::verify_secret(secret, DUMMY_HASH);
            return Ok(None);
        };

        if !api_key::verify_secret(secret, &record.secret_hash) {
            debug!(key_id = %record.key_id, "API key secret mismatch");
            return Ok(None);
        }

        if record.is_revoked() {
            debug!(key_id = %record.key_id, "Revoked API key presented");
            return Ok(None);
        }

        if record.is_expired() {
            debug!(key_id = %record.key_id, "Expired API key presented");
            return Ok(None);
        }

        self.touch_in_background(record.key_id.clone(), source_ip);
        Ok(Some(record))
    }

    fn touch_in_background(&self, key_id: String, source_ip: Option<String>) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.touch_api_key(&key_id, Utc::now(), source_ip).await {
                debug!(key_id = %key_id, error = %e, "Failed to record API key usage");
            }
        });
    }

    /// Exact scope membership
    pub fn has_scope(&self, key: &ApiKey, required: &str) -> bool {
        key.has_scope(required)
    }

    /// Revokes a key; `Ok(false)` if it was already revoked
    pub async fn revoke(&self, account_id: Uuid, key_id: &str, actor_id: Uuid) -> GateResult<bool> {
        self.require_key(account_id, key_id).await?;

        let changed = self.store.revoke_api_key(key_id, Utc::now()).await?;
        if changed {
            info!(account_id = %account_id, key_id = %key_id, actor_id = %actor_id, "API key revoked");
        }
        Ok(changed)
    }

    /// Revokes `key_id` and issues a replacement with the same name, scopes and expiry
    pub async fn regenerate(
        &self,
        account_id: Uuid,
        key_id: &str,
        actor_id: Uuid,
    ) -> GateResult<IssuedKey> {
        let old = self.require_key(account_id, key_id).await?;

        if old.is_revoked() {
            return Err(GateError::NotFound("API key not found".to_string()));
        }
        if old.is_expired() {
            return Err(CredentialError::Expired.into());
        }

        let (record, secret) = build_key(
            account_id,
            actor_id,
            old.name.clone(),
            old.scopes.clone(),
            old.expires_at,
        );

        let record = self
            .store
            .rotate_api_key(key_id, record, Utc::now())
            .await?
            .ok_or_else(|| {
                warn!(key_id = %key_id, "API key revoked concurrently with regeneration");
                GateError::NotFound("API key not found".to_string())
            })?;

        info!(
            account_id = %account_id,
            old_key_id = %key_id,
            key_id = %record.key_id,
            "API key regenerated"
        );

        Ok(IssuedKey { record, secret })
    }

    /// All keys for an account, newest first
    pub async fn list(&self, account_id: Uuid) -> GateResult<Vec<ApiKey>> {
        Ok(self.store.list_api_keys(account_id).await?)
    }

    /// Loads a key owned by `account_id`; other accounts' keys are `NotFound`
    pub async fn require_key(&self, account_id: Uuid, key_id: &str) -> GateResult<ApiKey> {
        match self.store.get_api_key(key_id).await? {
            Some(key) if key.account_id == account_id => Ok(key),
            _ => Err(GateError::NotFound("API key not found".to_string())),
        }
    }

    /// Whether the key was issued by the account's current owner
    ///
    /// Only the owner may revoke or regenerate such keys. Unknown keys report
    /// `false` and are answered with `NotFound` by the operation itself.
    pub async fn issued_by_owner(&self, account_id: Uuid, key_id: &str) -> GateResult<bool> {
        let Some(key) = self
            .store
            .get_api_key(key_id)
            .await?
            .filter(|key| key.account_id == account_id)
        else {
            return Ok(false);
        };

        let issuer = self.store.get_member(account_id, key.created_by).await?;
        Ok(matches!(issuer, Some(member) if member.role == AccountRole::Owner))
    }
}

fn build_key(
    account_id: Uuid,
    actor_id: Uuid,
    name: String,
    scopes: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
) -> (ApiKey, String) {
    let secret = api_key::generate_secret();

    let record = ApiKey {
        id: Uuid::new_v4(),
        account_id,
        key_id: api_key::generate_key_id(),
        secret_hash: api_key::hash_secret(&secret),
        name,
        scopes,
        created_by: actor_id,
        created_at: Utc::now(),
        expires_at,
        revoked_at: None,
        last_used_at: None,
        last_used_ip: None,
    };

    (record, secret)
}

fn validate_name(name: &str) -> Result<String, CredentialError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::EmptyName);
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(CredentialError::NameTooLong);
    }
    Ok(trimmed.to_string())
}

fn validate_scopes(scopes: &[String]) -> Result<(), CredentialError> {
    if scopes.is_empty() {
        return Err(CredentialError::NoScopes);
    }
    if let Some(unknown) = find_unknown_scope(scopes) {
        return Err(CredentialError::UnknownScope(unknown.to_string()));
    }
    Ok(())
}
