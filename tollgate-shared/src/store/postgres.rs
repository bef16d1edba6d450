/// PostgreSQL store
///
/// Runtime-checked sqlx queries against the schema in `migrations/`. Every
/// multi-row operation runs inside an explicit transaction:
///
/// - `create_account`: account row + owner membership
/// - `transfer_ownership`: owner row locked `FOR UPDATE`, demote then promote
///   (the partial unique index on `role = 'owner'` forbids the reverse order)
/// - `move_project`: per-account advisory lock, recursive ancestor check, update
/// - `rotate_api_key`: conditional revoke + insert
///
/// # Example
///
/// ```no_run
/// use tollgate_shared::store::postgres::{DatabaseConfig, PgStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// };
///
/// let store = PgStore::connect(config).await?;
/// store.run_migrations().await?;
/// # Ok(())
/// # }
/// ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AccountStore, ApiKeyStore, AuditStore, ProjectStore, StoreError, StoreResult};
use crate::features::{stored_overrides, PermissionOverrides};
use crate::models::account::{Account, AccountSettings, AccountStatus, AccountTier};
use crate::models::api_key::ApiKey;
use crate::models::audit::{AuditFilter, AuditLogEntry, Pagination};
use crate::models::member::{AccountMember, AccountRole};
use crate::models::project::{Project, ProjectMember, ProjectRole};
use crate::models::user::{normalize_email, User};

/// Configuration for the database connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of idle connections to keep warm
    pub min_connections: u32,

    /// Timeout for acquiring a connection (seconds)
    pub connect_timeout_seconds: u64,

    /// Idle connection lifetime (seconds)
    pub idle_timeout_seconds: Option<u64>,

    /// Maximum connection lifetime (seconds)
    pub max_lifetime_seconds: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            max_lifetime_seconds: Some(1800),
        }
    }
}

impl DatabaseConfig {
    /// Reads `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`
    ///
    /// Returns `None` when `DATABASE_URL` is unset.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Some(Self {
            url,
            max_connections,
            ..Default::default()
        })
    }
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a pool and verifies connectivity
    pub async fn connect(config: DatabaseConfig) -> StoreResult<Self> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Creating database connection pool"
        );

        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .test_before_acquire(true);

        if let Some(idle) = config.idle_timeout_seconds {
            options = options.idle_timeout(Duration::from_secs(idle));
        }
        if let Some(lifetime) = config.max_lifetime_seconds {
            options = options.max_lifetime(Duration::from_secs(lifetime));
        }

        let pool = options.connect(&config.url).await?;
        let store = Self::new(pool);
        store.health_check().await?;

        info!("Database connection pool created");
        Ok(store)
    }

    /// Applies pending migrations from `migrations/`
    pub async fn run_migrations(&self) -> StoreResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        let (one,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        if one != 1 {
            return Err(StoreError::Unavailable(
                "Health check returned unexpected value".to_string(),
            ));
        }
        debug!("Database health check passed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    name: String,
    tier: String,
    status: String,
    settings: Json<AccountSettings>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            name: row.name,
            tier: AccountTier::parse_or_free(&row.tier),
            status: AccountStatus::parse_or_suspended(&row.status),
            settings: row.settings.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    account_id: Uuid,
    user_id: Uuid,
    role: String,
    permissions: Json<JsonValue>,
    joined_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
}

impl From<MemberRow> for AccountMember {
    fn from(row: MemberRow) -> Self {
        let role = AccountRole::parse(&row.role).unwrap_or_else(|| {
            warn!(role = %row.role, user_id = %row.user_id, "Unknown stored role, treating as viewer");
            AccountRole::Viewer
        });

        let (permissions, dropped) = stored_overrides(&row.permissions.0);
        if !dropped.is_empty() {
            warn!(user_id = %row.user_id, dropped = ?dropped, "Ignoring stored permission overrides");
        }

        AccountMember {
            account_id: row.account_id,
            user_id: row.user_id,
            role,
            permissions,
            joined_at: row.joined_at,
            accepted_at: row.accepted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProjectMemberRow {
    project_id: Uuid,
    user_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
}

impl From<ProjectMemberRow> for ProjectMember {
    fn from(row: ProjectMemberRow) -> Self {
        ProjectMember {
            project_id: row.project_id,
            user_id: row.user_id,
            role: ProjectRole::parse(&row.role).unwrap_or(ProjectRole::Viewer),
            created_at: row.created_at,
        }
    }
}

const MEMBER_COLUMNS: &str =
    "account_id, user_id, role, permissions, joined_at, accepted_at";

const API_KEY_COLUMNS: &str = "id, account_id, key_id, secret_hash, name, scopes, created_by, \
     created_at, expires_at, revoked_at, last_used_at, last_used_ip";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn insert_api_key_row<'e, E>(executor: E, key: &ApiKey) -> StoreResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT INTO api_keys (id, account_id, key_id, secret_hash, name, scopes, created_by,
                               created_at, expires_at, revoked_at, last_used_at, last_used_ip)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(key.id)
    .bind(key.account_id)
    .bind(&key.key_id)
    .bind(&key.secret_hash)
    .bind(&key.name)
    .bind(&key.scopes)
    .bind(key.created_by)
    .bind(key.created_at)
    .bind(key.expires_at)
    .bind(key.revoked_at)
    .bind(key.last_used_at)
    .bind(&key.last_used_ip)
    .execute(executor)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            Err(StoreError::Conflict("Duplicate key id".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Postgres>, account_id: Uuid, filter: &AuditFilter) {
    qb.push(" WHERE account_id = ").push_bind(account_id);

    if let Some(action) = &filter.action {
        qb.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(resource_type) = &filter.resource_type {
        qb.push(" AND resource_type = ").push_bind(resource_type.clone());
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, name, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id, email, name, created_at",
        )
        .bind(user.id)
        .bind(normalize_email(&user.email))
        .bind(&user.name)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::Conflict("Email already registered".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, name, created_at FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_account(&self, account: Account, owner_id: Uuid) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO accounts (id, name, tier, status, settings, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(account.tier.as_str())
        .bind(account.status.as_str())
        .bind(Json(&account.settings))
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO account_members (account_id, user_id, role, permissions, joined_at, accepted_at)
             VALUES ($1, $2, 'owner', '{}', $3, $3)",
        )
        .bind(account.id)
        .bind(owner_id)
        .bind(account.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, name, tier, status, settings, created_at, updated_at
             FROM accounts WHERE id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Account::from))
    }

    async fn update_account_tier(&self, account_id: Uuid, tier: AccountTier) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE accounts SET tier = $2, updated_at = NOW() WHERE id = $1")
                .bind(account_id)
                .bind(tier.as_str())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_account_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE accounts SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(account_id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_account_settings(
        &self,
        account_id: Uuid,
        settings: &AccountSettings,
    ) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE accounts SET settings = $2, updated_at = NOW() WHERE id = $1")
                .bind(account_id)
                .bind(Json(settings))
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_member(
        &self,
        account_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<AccountMember>> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM account_members WHERE account_id = $1 AND user_id = $2"
        ))
        .bind(account_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(AccountMember::from))
    }

    async fn list_members(&self, account_id: Uuid) -> StoreResult<Vec<AccountMember>> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM account_members WHERE account_id = $1 ORDER BY joined_at"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AccountMember::from).collect())
    }

    async fn insert_member(&self, member: AccountMember) -> StoreResult<bool> {
        if member.role == AccountRole::Owner {
            return Err(StoreError::Conflict(
                "Owner can only be assigned by ownership transfer".to_string(),
            ));
        }

        let result = sqlx::query(
            "INSERT INTO account_members (account_id, user_id, role, permissions, joined_at, accepted_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (account_id, user_id) DO NOTHING",
        )
        .bind(member.account_id)
        .bind(member.user_id)
        .bind(member.role.as_str())
        .bind(Json(&member.permissions))
        .bind(member.joined_at)
        .bind(member.accepted_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn accept_member(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE account_members SET accepted_at = COALESCE(accepted_at, $3)
             WHERE account_id = $1 AND user_id = $2",
        )
        .bind(account_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_member_role(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        role: AccountRole,
    ) -> StoreResult<bool> {
        if role == AccountRole::Owner {
            return Err(StoreError::Conflict(
                "Owner can only be assigned by ownership transfer".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE account_members SET role = $3
             WHERE account_id = $1 AND user_id = $2 AND role <> 'owner'",
        )
        .bind(account_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        match self.get_member(account_id, user_id).await? {
            Some(member) if member.role == AccountRole::Owner => Err(StoreError::Conflict(
                "The account owner's role cannot be changed".to_string(),
            )),
            _ => Ok(false),
        }
    }

    async fn update_member_permissions(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        permissions: &PermissionOverrides,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE account_members SET permissions = $3 WHERE account_id = $1 AND user_id = $2",
        )
        .bind(account_id)
        .bind(user_id)
        .bind(Json(permissions))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_member(&self, account_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM account_members WHERE account_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(account_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        match role.as_deref() {
            None => return Ok(false),
            Some("owner") => {
                return Err(StoreError::Conflict(
                    "The account owner cannot be removed; transfer ownership first".to_string(),
                ));
            }
            Some(_) => {}
        }

        sqlx::query(
            "DELETE FROM project_members
             WHERE user_id = $2
               AND project_id IN (SELECT id FROM projects WHERE account_id = $1)",
        )
        .bind(account_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM account_members WHERE account_id = $1 AND user_id = $2")
            .bind(account_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn transfer_ownership(&self, account_id: Uuid, from: Uuid, to: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM account_members
             WHERE account_id = $1 AND role = 'owner' FOR UPDATE",
        )
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?;

        if owner != Some(from) {
            return Err(StoreError::Conflict(
                "Only the current owner can transfer ownership".to_string(),
            ));
        }
        if from == to {
            return Err(StoreError::Conflict(
                "Ownership target must be a different member".to_string(),
            ));
        }

        let target: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM account_members
             WHERE account_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(account_id)
        .bind(to)
        .fetch_optional(&mut *tx)
        .await?;

        if target.is_none() {
            return Err(StoreError::NotFound("Target is not a member".to_string()));
        }

        sqlx::query(
            "UPDATE account_members SET role = 'admin' WHERE account_id = $1 AND user_id = $2",
        )
        .bind(account_id)
        .bind(from)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE account_members SET role = 'owner' WHERE account_id = $1 AND user_id = $2",
        )
        .bind(account_id)
        .bind(to)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn create_project(&self, project: Project) -> StoreResult<Project> {
        if let Some(parent_id) = project.parent_id {
            let same_account: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM projects WHERE id = $1 AND account_id = $2)",
            )
            .bind(parent_id)
            .bind(project.account_id)
            .fetch_one(&self.pool)
            .await?;

            if !same_account {
                return Err(StoreError::NotFound("Parent project not found".to_string()));
            }
        }

        let project = sqlx::query_as::<_, Project>(
            "INSERT INTO projects (id, account_id, parent_id, name, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, account_id, parent_id, name, created_at",
        )
        .bind(project.id)
        .bind(project.account_id)
        .bind(project.parent_id)
        .bind(&project.name)
        .bind(project.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, account_id, parent_id, name, created_at FROM projects WHERE id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(project)
    }

    async fn list_projects(&self, account_id: Uuid) -> StoreResult<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            "SELECT id, account_id, parent_id, name, created_at
             FROM projects WHERE account_id = $1 ORDER BY created_at",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(projects)
    }

    async fn move_project(&self, project_id: Uuid, new_parent: Option<Uuid>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let account_id: Option<Uuid> =
            sqlx::query_scalar("SELECT account_id FROM projects WHERE id = $1")
                .bind(project_id)
                .fetch_optional(&mut *tx)
                .await?;
        let account_id =
            account_id.ok_or_else(|| StoreError::NotFound("Project not found".to_string()))?;

        // Serializes tree edits within one account
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(account_id.to_string())
            .execute(&mut *tx)
            .await?;

        if let Some(parent_id) = new_parent {
            let same_account: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM projects WHERE id = $1 AND account_id = $2)",
            )
            .bind(parent_id)
            .bind(account_id)
            .fetch_one(&mut *tx)
            .await?;

            if !same_account {
                return Err(StoreError::NotFound("Parent project not found".to_string()));
            }

            let creates_cycle: bool = sqlx::query_scalar(
                "WITH RECURSIVE ancestors(id, parent_id) AS (
                    SELECT id, parent_id FROM projects WHERE id = $1
                    UNION
                    SELECT p.id, p.parent_id FROM projects p
                    JOIN ancestors a ON p.id = a.parent_id
                 )
                 SELECT EXISTS (SELECT 1 FROM ancestors WHERE id = $2)",
            )
            .bind(parent_id)
            .bind(project_id)
            .fetch_one(&mut *tx)
            .await?;

            if creates_cycle {
                return Err(StoreError::Conflict(
                    "A project cannot become its own ancestor".to_string(),
                ));
            }
        }

        sqlx::query("UPDATE projects SET parent_id = $2 WHERE id = $1")
            .bind(project_id)
            .bind(new_parent)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_project_member(&self, member: ProjectMember) -> StoreResult<ProjectMember> {
        let row = sqlx::query_as::<_, ProjectMemberRow>(
            "INSERT INTO project_members (project_id, user_id, role, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (project_id, user_id) DO UPDATE SET role = EXCLUDED.role
             RETURNING project_id, user_id, role, created_at",
        )
        .bind(member.project_id)
        .bind(member.user_id)
        .bind(member.role.as_str())
        .bind(member.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_project_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<ProjectMember>> {
        let row = sqlx::query_as::<_, ProjectMemberRow>(
            "SELECT project_id, user_id, role, created_at
             FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProjectMember::from))
    }

    async fn delete_project_member(&self, project_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
                .bind(project_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_member_projects(
        &self,
        account_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(
            "SELECT p.id, p.account_id, p.parent_id, p.name, p.created_at
             FROM projects p
             JOIN project_members pm ON pm.project_id = p.id
             WHERE p.account_id = $1 AND pm.user_id = $2
             ORDER BY p.created_at",
        )
        .bind(account_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(projects)
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn insert_api_key(&self, key: ApiKey) -> StoreResult<ApiKey> {
        insert_api_key_row(&self.pool, &key).await?;
        Ok(key)
    }

    async fn get_api_key(&self, key_id: &str) -> StoreResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_id = $1"
        ))
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn list_api_keys(&self, account_id: Uuid) -> StoreResult<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE account_id = $1 ORDER BY created_at DESC"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn revoke_api_key(&self, key_id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE api_keys SET revoked_at = $2 WHERE key_id = $1 AND revoked_at IS NULL",
        )
        .bind(key_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rotate_api_key(
        &self,
        old_key_id: &str,
        new_key: ApiKey,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ApiKey>> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE api_keys SET revoked_at = $2 WHERE key_id = $1 AND revoked_at IS NULL",
        )
        .bind(old_key_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        insert_api_key_row(&mut *tx, &new_key).await?;
        tx.commit().await?;

        Ok(Some(new_key))
    }

    async fn touch_api_key(
        &self,
        key_id: &str,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2, last_used_ip = $3 WHERE key_id = $1")
            .bind(key_id)
            .bind(at)
            .bind(ip)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, account_id, action, resource_type, resource_id,
                                     user_id, api_key_id, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.account_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.user_id)
        .bind(entry.api_key_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_audit(
        &self,
        account_id: Uuid,
        filter: &AuditFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<(Vec<AuditLogEntry>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filters(&mut count, account_id, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut items = QueryBuilder::<Postgres>::new(
            "SELECT id, account_id, action, resource_type, resource_id, user_id, api_key_id,
                    details, created_at
             FROM audit_logs",
        );
        push_audit_filters(&mut items, account_id, filter);
        items.push(" ORDER BY created_at DESC, id DESC");

        if let Some(p) = pagination {
            items.push(" LIMIT ").push_bind(i64::from(p.per_page));
            items
                .push(" OFFSET ")
                .push_bind(i64::try_from(p.offset()).unwrap_or(i64::MAX));
        }

        let entries = items
            .build_query_as::<AuditLogEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok((entries, u64::try_from(total).unwrap_or(0)))
    }

    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connect_timeout_seconds, 30);
    }

    #[test]
    fn test_member_row_unknown_role_is_viewer() {
        let row = MemberRow {
            account_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "superadmin".into(),
            permissions: Json(serde_json::json!({})),
            joined_at: Utc::now(),
            accepted_at: None,
        };
        let member = AccountMember::from(row);
        assert_eq!(member.role, AccountRole::Viewer);
    }

    #[test]
    fn test_member_row_skips_unknown_overrides() {
        let row = MemberRow {
            account_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "member".into(),
            permissions: Json(serde_json::json!({
                "webhooks": { "access": true },
                "retired_feature": { "access": true },
            })),
            joined_at: Utc::now(),
            accepted_at: Some(Utc::now()),
        };

        let member = AccountMember::from(row);
        assert_eq!(member.role, AccountRole::Member);
        assert_eq!(member.permissions.len(), 1);
        assert_eq!(
            member.permissions[&crate::features::Feature::Webhooks],
            crate::features::FeatureAccess::GRANTED
        );
    }

    #[test]
    fn test_account_row_unknown_tier_is_free() {
        let row = AccountRow {
            id: Uuid::new_v4(),
            name: "a".into(),
            tier: "enterprise".into(),
            status: "active".into(),
            settings: Json(AccountSettings::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let account = Account::from(row);
        assert_eq!(account.tier, AccountTier::Free);
        assert!(account.is_active());
    }
}
