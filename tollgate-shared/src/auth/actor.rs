/// Resolved request actors
///
/// Every protected call carries a [`RequestContext`]: who is acting (a user
/// session or an API key), inside which account, and from which source IP.

use uuid::Uuid;

use crate::models::api_key::ApiKey;
use crate::models::audit::AuditActor;

/// Authenticated principal for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// Human session scoped to an account
    User { user_id: Uuid, account_id: Uuid },

    /// API key with its granted scopes
    ApiKey {
        api_key_id: Uuid,
        key_id: String,
        account_id: Uuid,
        scopes: Vec<String>,
    },
}

impl Actor {
    pub fn user(user_id: Uuid, account_id: Uuid) -> Self {
        Actor::User {
            user_id,
            account_id,
        }
    }

    pub fn from_api_key(key: &ApiKey) -> Self {
        Actor::ApiKey {
            api_key_id: key.id,
            key_id: key.key_id.clone(),
            account_id: key.account_id,
            scopes: key.scopes.clone(),
        }
    }

    pub fn account_id(&self) -> Uuid {
        match self {
            Actor::User { account_id, .. } | Actor::ApiKey { account_id, .. } => *account_id,
        }
    }

    /// User id for session actors
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::User { user_id, .. } => Some(*user_id),
            Actor::ApiKey { .. } => None,
        }
    }

    /// Column values recorded in the audit trail
    pub fn audit_actor(&self) -> AuditActor {
        match self {
            Actor::User { user_id, .. } => AuditActor::User(*user_id),
            Actor::ApiKey { api_key_id, .. } => AuditActor::ApiKey(*api_key_id),
        }
    }

    /// Stable identifier used in rate-limit keys
    pub fn identifier(&self) -> String {
        match self {
            Actor::User { user_id, .. } => format!("user:{user_id}"),
            Actor::ApiKey { key_id, .. } => format!("key:{key_id}"),
        }
    }
}

/// Actor plus request metadata
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: Actor,
    pub source_ip: Option<String>,
}

impl RequestContext {
    pub fn new(actor: Actor, source_ip: Option<String>) -> Self {
        Self { actor, source_ip }
    }

    pub fn account_id(&self) -> Uuid {
        self.actor.account_id()
    }
}
