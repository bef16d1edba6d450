/// In-memory store for tests and local development
///
/// All tables live behind one `tokio::sync::RwLock`, so every multi-row
/// operation runs under a single write guard and is atomic with respect to
/// other callers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, ApiKeyStore, AuditStore, ProjectStore, StoreError, StoreResult};
use crate::features::PermissionOverrides;
use crate::models::account::{Account, AccountSettings, AccountStatus, AccountTier};
use crate::models::api_key::ApiKey;
use crate::models::audit::{AuditFilter, AuditLogEntry, Pagination};
use crate::models::member::{AccountMember, AccountRole};
use crate::models::project::{Project, ProjectMember};
use crate::models::user::{normalize_email, User};

/// In-memory store implementation
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    accounts: HashMap<Uuid, Account>,
    members: HashMap<(Uuid, Uuid), AccountMember>,
    projects: HashMap<Uuid, Project>,
    project_members: HashMap<(Uuid, Uuid), ProjectMember>,
    api_keys: HashMap<String, ApiKey>,
    audit: Vec<AuditLogEntry>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    /// True if `ancestor` is `project` or one of its ancestors
    fn is_ancestor_or_self(&self, ancestor: Uuid, project: Uuid) -> bool {
        let mut cursor = Some(project);
        let mut steps = 0usize;

        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.projects.len() {
                return true;
            }
            cursor = self.projects.get(&id).and_then(|p| p.parent_id);
        }

        false
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_user(&self, mut user: User) -> StoreResult<User> {
        let mut tables = self.inner.write().await;
        user.email = normalize_email(&user.email);

        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }

        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.inner.read().await;
        let email = normalize_email(email);
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_account(&self, account: Account, owner_id: Uuid) -> StoreResult<Account> {
        let mut tables = self.inner.write().await;

        if tables.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict("Account already exists".to_string()));
        }

        let mut owner = AccountMember::new(account.id, owner_id, AccountRole::Owner);
        owner.accepted_at = Some(account.created_at);

        tables.members.insert((account.id, owner_id), owner);
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.inner.read().await.accounts.get(&account_id).cloned())
    }

    async fn update_account_tier(&self, account_id: Uuid, tier: AccountTier) -> StoreResult<bool> {
        let mut tables = self.inner.write().await;
        Ok(match tables.accounts.get_mut(&account_id) {
            Some(account) => {
                account.tier = tier;
                account.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn update_account_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.write().await;
        Ok(match tables.accounts.get_mut(&account_id) {
            Some(account) => {
                account.status = status;
                account.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn update_account_settings(
        &self,
        account_id: Uuid,
        settings: &AccountSettings,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.write().await;
        Ok(match tables.accounts.get_mut(&account_id) {
            Some(account) => {
                account.settings = settings.clone();
                account.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn get_member(
        &self,
        account_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<AccountMember>> {
        let tables = self.inner.read().await;
        Ok(tables.members.get(&(account_id, user_id)).cloned())
    }

    async fn list_members(&self, account_id: Uuid) -> StoreResult<Vec<AccountMember>> {
        let tables = self.inner.read().await;
        let mut members: Vec<_> = tables
            .members
            .values()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members)
    }

    async fn insert_member(&self, member: AccountMember) -> StoreResult<bool> {
        if member.role == AccountRole::Owner {
            return Err(StoreError::Conflict(
                "Owner can only be assigned by ownership transfer".to_string(),
            ));
        }

        let mut tables = self.inner.write().await;
        let key = (member.account_id, member.user_id);

        if tables.members.contains_key(&key) {
            return Ok(false);
        }

        tables.members.insert(key, member);
        Ok(true)
    }

    async fn accept_member(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.write().await;
        Ok(match tables.members.get_mut(&(account_id, user_id)) {
            Some(member) => {
                member.accepted_at.get_or_insert(at);
                true
            }
            None => false,
        })
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

        let mut tables = self.inner.write().await;
        match tables.members.get_mut(&(account_id, user_id)) {
            Some(member) if member.role == AccountRole::Owner => Err(StoreError::Conflict(
                "The account owner's role cannot be changed".to_string(),
            )),
            Some(member) => {
                member.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_member_permissions(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        permissions: &PermissionOverrides,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.write().await;
        Ok(match tables.members.get_mut(&(account_id, user_id)) {
            Some(member) => {
                member.permissions = permissions.clone();
                true
            }
            None => false,
        })
    }

    async fn delete_member(&self, account_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.inner.write().await;

        match tables.members.get(&(account_id, user_id)) {
            None => return Ok(false),
            Some(member) if member.role == AccountRole::Owner => {
                return Err(StoreError::Conflict(
                    "The account owner cannot be removed; transfer ownership first".to_string(),
                ));
            }
            Some(_) => {}
        }

        tables.members.remove(&(account_id, user_id));

        let account_projects: Vec<Uuid> = tables
            .projects
            .values()
            .filter(|p| p.account_id == account_id)
            .map(|p| p.id)
            .collect();
        for project_id in account_projects {
            tables.project_members.remove(&(project_id, user_id));
        }

        Ok(true)
    }

    async fn transfer_ownership(&self, account_id: Uuid, from: Uuid, to: Uuid) -> StoreResult<()> {
        let mut tables = self.inner.write().await;

        let from_is_owner = tables
            .members
            .get(&(account_id, from))
            .map(|m| m.role == AccountRole::Owner)
            .unwrap_or(false);
        if !from_is_owner {
            return Err(StoreError::Conflict(
                "Only the current owner can transfer ownership".to_string(),
            ));
        }

        if from == to {
            return Err(StoreError::Conflict(
                "Ownership target must be a different member".to_string(),
            ));
        }

        if !tables.members.contains_key(&(account_id, to)) {
            return Err(StoreError::NotFound("Target is not a member".to_string()));
        }

        if let Some(member) = tables.members.get_mut(&(account_id, from)) {
            member.role = AccountRole::Admin;
        }
        if let Some(member) = tables.members.get_mut(&(account_id, to)) {
            member.role = AccountRole::Owner;
        }

        Ok(())
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create_project(&self, project: Project) -> StoreResult<Project> {
        let mut tables = self.inner.write().await;

        if let Some(parent_id) = project.parent_id {
            let same_account = tables
                .projects
                .get(&parent_id)
                .map(|p| p.account_id == project.account_id)
                .unwrap_or(false);
            if !same_account {
                return Err(StoreError::NotFound("Parent project not found".to_string()));
            }
        }

        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>> {
        Ok(self.inner.read().await.projects.get(&project_id).cloned())
    }

    async fn list_projects(&self, account_id: Uuid) -> StoreResult<Vec<Project>> {
        let tables = self.inner.read().await;
        let mut projects: Vec<_> = tables
            .projects
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }

    async fn move_project(&self, project_id: Uuid, new_parent: Option<Uuid>) -> StoreResult<()> {
        let mut tables = self.inner.write().await;

        let account_id = tables
            .projects
            .get(&project_id)
            .map(|p| p.account_id)
            .ok_or_else(|| StoreError::NotFound("Project not found".to_string()))?;

        if let Some(parent_id) = new_parent {
            let same_account = tables
                .projects
                .get(&parent_id)
                .map(|p| p.account_id == account_id)
                .unwrap_or(false);
            if !same_account {
                return Err(StoreError::NotFound("Parent project not found".to_string()));
            }

            if tables.is_ancestor_or_self(project_id, parent_id) {
                return Err(StoreError::Conflict(
                    "A project cannot become its own ancestor".to_string(),
                ));
            }
        }

        if let Some(project) = tables.projects.get_mut(&project_id) {
            project.parent_id = new_parent;
        }
        Ok(())
    }

    async fn upsert_project_member(&self, member: ProjectMember) -> StoreResult<ProjectMember> {
        let mut tables = self.inner.write().await;
        tables
            .project_members
            .insert((member.project_id, member.user_id), member.clone());
        Ok(member)
    }

    async fn get_project_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<ProjectMember>> {
        let tables = self.inner.read().await;
        Ok(tables.project_members.get(&(project_id, user_id)).cloned())
    }

    async fn delete_project_member(&self, project_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.inner.write().await;
        Ok(tables.project_members.remove(&(project_id, user_id)).is_some())
    }

    async fn list_member_projects(
        &self,
        account_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Vec<Project>> {
        let tables = self.inner.read().await;
        let mut projects: Vec<_> = tables
            .projects
            .values()
            .filter(|p| {
                p.account_id == account_id && tables.project_members.contains_key(&(p.id, user_id))
            })
            .cloned()
            .collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn insert_api_key(&self, key: ApiKey) -> StoreResult<ApiKey> {
        let mut tables = self.inner.write().await;

        if tables.api_keys.contains_key(&key.key_id) {
            return Err(StoreError::Conflict("Duplicate key id".to_string()));
        }

        tables.api_keys.insert(key.key_id.clone(), key.clone());
        Ok(key)
    }

    async fn get_api_key(&self, key_id: &str) -> StoreResult<Option<ApiKey>> {
        Ok(self.inner.read().await.api_keys.get(key_id).cloned())
    }

    async fn list_api_keys(&self, account_id: Uuid) -> StoreResult<Vec<ApiKey>> {
        let tables = self.inner.read().await;
        let mut keys: Vec<_> = tables
            .api_keys
            .values()
            .filter(|k| k.account_id == account_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn revoke_api_key(&self, key_id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.inner.write().await;
        Ok(match tables.api_keys.get_mut(key_id) {
            Some(key) if key.revoked_at.is_none() => {
                key.revoked_at = Some(at);
                true
            }
            _ => false,
        })
    }

    async fn rotate_api_key(
        &self,
        old_key_id: &str,
        new_key: ApiKey,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<ApiKey>> {
        let mut tables = self.inner.write().await;

        match tables.api_keys.get(old_key_id) {
            Some(old) if old.revoked_at.is_none() => {}
            _ => return Ok(None),
        }

        if tables.api_keys.contains_key(&new_key.key_id) {
            return Err(StoreError::Conflict("Duplicate key id".to_string()));
        }

        if let Some(old) = tables.api_keys.get_mut(old_key_id) {
            old.revoked_at = Some(at);
        }
        tables.api_keys.insert(new_key.key_id.clone(), new_key.clone());

        Ok(Some(new_key))
    }

    async fn touch_api_key(
        &self,
        key_id: &str,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        if let Some(key) = tables.api_keys.get_mut(key_id) {
            key.last_used_at = Some(at);
            key.last_used_ip = ip;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: AuditLogEntry) -> StoreResult<()> {
        if entry.user_id.is_some() && entry.api_key_id.is_some() {
            return Err(StoreError::Conflict(
                "Audit entry cannot name both a user and an API key".to_string(),
            ));
        }

        self.inner.write().await.audit.push(entry);
        Ok(())
    }

    async fn query_audit(
        &self,
        account_id: Uuid,
        filter: &AuditFilter,
        pagination: Option<Pagination>,
    ) -> StoreResult<(Vec<AuditLogEntry>, u64)> {
        let tables = self.inner.read().await;

        // Append order breaks ties between identical timestamps
        let mut matching: Vec<&AuditLogEntry> = tables
            .audit
            .iter()
            .rev()
            .filter(|e| e.account_id == account_id && filter.matches(e))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let items = match pagination {
            Some(p) => matching
                .into_iter()
                .skip(usize::try_from(p.offset()).unwrap_or(usize::MAX))
                .take(p.per_page as usize)
                .cloned()
                .collect(),
            None => matching.into_iter().cloned().collect(),
        };

        Ok((items, total))
    }

    async fn purge_audit_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.inner.write().await;
        let before = tables.audit.len();
        tables.audit.retain(|e| e.created_at >= cutoff);
        Ok((before - tables.audit.len()) as u64)
    }
}
