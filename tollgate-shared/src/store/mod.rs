/// Storage abstraction
///
/// The authorization core treats persistence as a keyed store behind a small
/// set of async traits. Two backends ship with the crate:
///
/// - [`memory::MemoryStore`]: `RwLock`-guarded maps for tests and local runs
/// - [`postgres::PgStore`]: PostgreSQL via sqlx with explicit transactions
///
/// Multi-row invariants (sole owner, project tree acyclicity, key rotation)
/// are enforced inside the backend so that concurrent callers cannot
/// interleave between the check and the write.
///
/// # Example
///
/// ```
/// use tollgate_shared::store::{memory::MemoryStore, AccountStore};
/// use tollgate_shared::models::user::User;
///
/// # async fn example() -> Result<(), tollgate_shared::store::StoreError> {
/// let store = MemoryStore::new();
/// let user = store.create_user(User::new("owner@example.com", None)).await?;
/// assert!(store.find_user_by_email("OWNER@example.com").await?.is_some());
/// # let _ = user;
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::features::PermissionOverrides;
use crate::models::account::{Account, AccountSettings, AccountStatus, AccountTier};
use crate::models::api_key::ApiKey;
use crate::models::audit::{AuditFilter, AuditLogEntry, Pagination};
use crate::models::member::{AccountMember, AccountRole};
use crate::models::project::{Project, ProjectMember};
use crate::models::user::User;

/// Errors raised by storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A write would break a stored invariant
    #[error("{0}")]
    Conflict(String),

    /// The row a write targets does not exist
    #[error("{0}")]
    NotFound(String),

    /// Stored data could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Backend not reachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Accounts, identities and account memberships
#[async_trait]
pub trait AccountStore {
    /// Inserts an identity; fails with `Conflict` if the email is taken
    async fn create_user(&self, user: User) -> StoreResult<User>;

    /// Case-insensitive email lookup
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Inserts the account and its sole owner membership together
    async fn create_account(&self, account: Account, owner_id: Uuid) -> StoreResult<Account>;

    async fn get_account(&self, account_id: Uuid) -> StoreResult<Option<Account>>;

    async fn update_account_tier(&self, account_id: Uuid, tier: AccountTier) -> StoreResult<bool>;

    async fn update_account_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> StoreResult<bool>;

    async fn update_account_settings(
        &self,
        account_id: Uuid,
        settings: &AccountSettings,
    ) -> StoreResult<bool>;

    async fn get_member(
        &self,
        account_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<AccountMember>>;

    async fn list_members(&self, account_id: Uuid) -> StoreResult<Vec<AccountMember>>;

    /// Inserts a membership; returns `false` if the user is already a member
    ///
    /// Owner rows can only be created by `create_account`/`transfer_ownership`.
    async fn insert_member(&self, member: AccountMember) -> StoreResult<bool>;

    /// Sets `accepted_at` if still pending; returns `false` if no row exists
    async fn accept_member(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Changes a non-owner member's role to a non-owner role
    async fn update_member_role(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        role: AccountRole,
    ) -> StoreResult<bool>;

    async fn update_member_permissions(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        permissions: &PermissionOverrides,
    ) -> StoreResult<bool>;

    /// Removes a non-owner member and their project memberships in the account
    async fn delete_member(&self, account_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    /// Demotes `from` (must be owner) to admin and promotes `to` (must be a member)
    async fn transfer_ownership(&self, account_id: Uuid, from: Uuid, to: Uuid) -> StoreResult<()>;
}

/// Project tree and project memberships
#[async_trait]
pub trait ProjectStore {
    async fn create_project(&self, project: Project) -> StoreResult<Project>;

    async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>>;

    async fn list_projects(&self, account_id: Uuid) -> StoreResult<Vec<Project>>;

    /// Reparents a project; `Conflict` if it would become its own ancestor
    async fn move_project(&self, project_id: Uuid, new_parent: Option<Uuid>) -> StoreResult<()>;

    /// Inserts or replaces a project membership
    async fn upsert_project_member(&self, member: ProjectMember) -> StoreResult<ProjectMember>;

    async fn get_project_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<ProjectMember>>;

    async fn delete_project_member(&self, project_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    /// Projects in `account_id` where `user_id` has a membership row
    async fn list_member_projects(
        &self,
        account_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Vec<Project>>;
}

/// API key records
#[async_trait]
pub trait ApiKeyStore {
    /// Inserts a key; `Conflict` on duplicate `key_id`
    async fn insert_api_key(&self, key: ApiKey) -> StoreResult<ApiKey>;

    async fn get_api_key(&self, key_id: &str) -> StoreResult<Option<ApiKey>>;

    async fn list_api_keys(&self, account_id: Uuid) -> StoreResult<Vec<ApiKey>>;

    /// Sets `revoked_at` if not already revoked; returns whether anything changed
    async fn revoke_api_key(&self, key_id: &str, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Revokes `old_key_id` and inserts `new_key` as one unit
    ///
    /// Returns `None` when the old key is missing or already revoked, in which
    /// case nothing is written.
    async fn rotate_api_key(
        &self,
        old_key_id: &str,
        new_key: ApiKey,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ApiKey>>;

    /// Records usage; best effort
    async fn touch_api_key(
        &self,
        key_id: &str,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> StoreResult<()>;
}

/// Append-only audit entries
#[async_trait]
pub trait AuditStore {
    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<()>;

    /// Newest-first entries for an account plus the unpaginated match count
    ///
    /// `None` pagination returns every matching entry.
    async fn query_audit(
        &self,
        account_id: Uuid,
        filter: &AuditFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<(Vec<AuditLogEntry>, u64)>;

    /// Deletes entries created before `cutoff` across all accounts
    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// Composite store trait
pub trait Store: AccountStore + ProjectStore + ApiKeyStore + AuditStore + Send + Sync {}

impl<T> Store for T where T: AccountStore + ProjectStore + ApiKeyStore + AuditStore + Send + Sync {}
