/// Role & tier resolution
///
/// [`RoleResolver`] answers "what may this user do in this account" and owns
/// the membership and project-tree business rules. It does not authorize the
/// *caller* of a mutation; that is the [`Gate`](crate::Gate)'s job. Every
/// method here assumes the caller was already allowed to proceed.
///
/// # Permission Model
///
/// 1. **Membership**: a user without a member row has no role and no access
/// 2. **Role**: `viewer < member < admin = owner`
/// 3. **Tier gate**: features above the account's tier are always denied
/// 4. **Overrides**: a per-member `{access}` entry beats the role default
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tollgate_shared::auth::authorization::RoleResolver;
/// use tollgate_shared::features::Feature;
/// use tollgate_shared::models::account::{AccountTier, CreateAccount};
/// use tollgate_shared::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), tollgate_shared::GateError> {
/// let resolver = RoleResolver::new(Arc::new(MemoryStore::new()));
/// let owner = Uuid::new_v4();
/// let account = resolver
///     .create_account(CreateAccount { name: "Acme".into(), tier: AccountTier::Free, owner_id: owner })
///     .await?;
///
/// assert!(resolver.effective_permission(account.id, owner, Feature::Links).await?);
/// assert!(!resolver.effective_permission(account.id, owner, Feature::Visitors).await?);
/// # Ok(())
/// # }
/// ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{GateError, GateResult};
use crate::features::{self, Feature, FeatureAccess, FeatureAvailability, PermissionOverrides};
use crate::models::account::{
    Account, AccountSettings, AccountStatus, AccountTier, CreateAccount,
};
use crate::models::member::{AccountMember, AccountRole};
use crate::models::project::{CreateProject, Project, ProjectMember, ProjectRole};
use crate::store::Store;

const MAX_NAME_LENGTH: usize = 255;

/// Role, tier and membership resolver over a [`Store`]
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn Store>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the member's role, `None` if not a member
    pub async fn get_role(&self, account_id: Uuid, user_id: Uuid) -> GateResult<Option<AccountRole>> {
        let member = self.store.get_member(account_id, user_id).await?;
        Ok(member.map(|m| m.role))
    }

    pub async fn get_member(&self, account_id: Uuid, user_id: Uuid) -> GateResult<Option<AccountMember>> {
        Ok(self.store.get_member(account_id, user_id).await?)
    }

    /// Checks the role order `viewer < member < admin = owner`
    pub async fn has_role_at_least(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        minimum: AccountRole,
    ) -> GateResult<bool> {
        Ok(self
            .get_role(account_id, user_id)
            .await?
            .map(|role| role.has_permission(minimum))
            .unwrap_or(false))
    }

    /// Loads an account or fails with a generic `NotFound`
    pub async fn get_account(&self, account_id: Uuid) -> GateResult<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| GateError::NotFound("Account not found".to_string()))
    }

    /// Effective access to a feature: tier gate, then override, then role default
    pub async fn effective_permission(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        feature: Feature,
    ) -> GateResult<bool> {
        let Some(account) = self.store.get_account(account_id).await? else {
            return Ok(false);
        };
        let Some(member) = self.store.get_member(account_id, user_id).await? else {
            return Ok(false);
        };

        Ok(features::resolve_permission(
            account.tier,
            member.role,
            &member.permissions,
            feature,
        ))
    }

    /// Effective access to every catalog feature
    pub async fn effective_permissions(
        &self,
        account_id: Uuid,
        user_id: Uuid,
    ) -> GateResult<BTreeMap<Feature, bool>> {
        let account = self.get_account(account_id).await?;
        let member = self.store.get_member(account_id, user_id).await?;

        Ok(Feature::ALL
            .into_iter()
            .map(|feature| {
                let allowed = member
                    .as_ref()
                    .map(|m| {
                        features::resolve_permission(account.tier, m.role, &m.permissions, feature)
                    })
                    .unwrap_or(false);
                (feature, allowed)
            })
            .collect())
    }

    /// Tier availability table for an account
    pub async fn available_features(
        &self,
        account_id: Uuid,
    ) -> GateResult<BTreeMap<Feature, FeatureAvailability>> {
        let account = self.get_account(account_id).await?;
        Ok(features::available_features(account.tier))
    }

    /// True iff the user has a project membership, or is an account admin/owner
    pub async fn user_can_access_project(&self, project_id: Uuid, user_id: Uuid) -> GateResult<bool> {
        let Some(project) = self.store.get_project(project_id).await? else {
            return Ok(false);
        };

        if self
            .has_role_at_least(project.account_id, user_id, AccountRole::Admin)
            .await?
        {
            return Ok(true);
        }

        Ok(self
            .store
            .get_project_member(project_id, user_id)
            .await?
            .is_some())
    }

    /// Creates an account with `owner_id` as its sole owner
    pub async fn create_account(&self, data: CreateAccount) -> GateResult<Account> {
        let name = validate_name(&data.name, "Account name")?;
        let now = Utc::now();

        let account = Account {
            id: Uuid::new_v4(),
            name,
            tier: data.tier,
            status: AccountStatus::Active,
            settings: AccountSettings::default(),
            created_at: now,
            updated_at: now,
        };

        let account = self.store.create_account(account, data.owner_id).await?;
        info!(account_id = %account.id, owner_id = %data.owner_id, tier = account.tier.as_str(), "Account created");
        Ok(account)
    }

    /// Changes tier; member rows are untouched
    pub async fn set_tier(&self, account_id: Uuid, tier: AccountTier) -> GateResult<()> {
        if !self.store.update_account_tier(account_id, tier).await? {
            return Err(GateError::NotFound("Account not found".to_string()));
        }
        info!(account_id = %account_id, tier = tier.as_str(), "Account tier changed");
        Ok(())
    }

    pub async fn set_status(&self, account_id: Uuid, status: AccountStatus) -> GateResult<()> {
        if !self.store.update_account_status(account_id, status).await? {
            return Err(GateError::NotFound("Account not found".to_string()));
        }
        info!(account_id = %account_id, status = status.as_str(), "Account status changed");
        Ok(())
    }

    /// Merges a settings patch and returns the stored result
    pub async fn update_settings(
        &self,
        account_id: Uuid,
        patch: AccountSettings,
    ) -> GateResult<AccountSettings> {
        if let Some(branding) = &patch.login_page {
            branding.validate().map_err(GateError::Validation)?;
        }

        let mut account = self.get_account(account_id).await?;
        account.settings.merge(patch);

        if !self
            .store
            .update_account_settings(account_id, &account.settings)
            .await?
        {
            return Err(GateError::NotFound("Account not found".to_string()));
        }

        Ok(account.settings)
    }

    /// Atomically demotes the current owner to admin and promotes `to`
    pub async fn transfer_ownership(&self, account_id: Uuid, from: Uuid, to: Uuid) -> GateResult<()> {
        self.store.transfer_ownership(account_id, from, to).await?;
        info!(account_id = %account_id, from = %from, to = %to, "Ownership transferred");
        Ok(())
    }

    /// Adds a pending member by email
    ///
    /// Unknown emails and existing members fail with the same generic error.
    pub async fn invite_member(
        &self,
        account_id: Uuid,
        email: &str,
        role: AccountRole,
    ) -> GateResult<AccountMember> {
        if role == AccountRole::Owner {
            return Err(GateError::Validation(
                "Owner cannot be invited; transfer ownership instead".to_string(),
            ));
        }

        let Some(user) = self.store.find_user_by_email(email).await? else {
            debug!(account_id = %account_id, "Invite target not found");
            return Err(GateError::member_lookup_failed());
        };

        let member = AccountMember::new(account_id, user.id, role);
        if !self.store.insert_member(member.clone()).await? {
            debug!(account_id = %account_id, "Invite target already a member");
            return Err(GateError::member_lookup_failed());
        }

        Ok(member)
    }

    /// Marks a pending membership accepted; idempotent
    pub async fn accept_invite(&self, account_id: Uuid, user_id: Uuid) -> GateResult<AccountMember> {
        if !self.store.accept_member(account_id, user_id, Utc::now()).await? {
            return Err(GateError::NotFound("Invitation not found".to_string()));
        }
        self.require_member(account_id, user_id).await
    }

    /// Changes a non-owner's role to a non-owner role
    pub async fn change_role(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        role: AccountRole,
    ) -> GateResult<AccountMember> {
        if role == AccountRole::Owner {
            return Err(GateError::Validation(
                "Use ownership transfer to assign the owner role".to_string(),
            ));
        }

        if !self.store.update_member_role(account_id, user_id, role).await? {
            return Err(GateError::NotFound("Member not found".to_string()));
        }
        self.require_member(account_id, user_id).await
    }

    /// Removes a non-owner member and their project memberships
    pub async fn remove_member(&self, account_id: Uuid, user_id: Uuid) -> GateResult<()> {
        if !self.store.delete_member(account_id, user_id).await? {
            return Err(GateError::NotFound("Member not found".to_string()));
        }
        Ok(())
    }

    /// Replaces a member's feature overrides
    pub async fn set_permission_overrides(
        &self,
        account_id: Uuid,
        user_id: Uuid,
        overrides: PermissionOverrides,
    ) -> GateResult<AccountMember> {
        if !self
            .store
            .update_member_permissions(account_id, user_id, &overrides)
            .await?
        {
            return Err(GateError::NotFound("Member not found".to_string()));
        }
        self.require_member(account_id, user_id).await
    }

    pub async fn list_members(&self, account_id: Uuid) -> GateResult<Vec<AccountMember>> {
        Ok(self.store.list_members(account_id).await?)
    }

    async fn require_member(&self, account_id: Uuid, user_id: Uuid) -> GateResult<AccountMember> {
        self.store
            .get_member(account_id, user_id)
            .await?
            .ok_or_else(|| GateError::NotFound("Member not found".to_string()))
    }

    /// Creates a project; the parent must belong to the same account
    pub async fn create_project(&self, data: CreateProject) -> GateResult<Project> {
        let name = validate_name(&data.name, "Project name")?;

        let project = Project {
            id: Uuid::new_v4(),
            account_id: data.account_id,
            parent_id: data.parent_id,
            name,
            created_at: Utc::now(),
        };

        Ok(self.store.create_project(project).await?)
    }

    /// Loads a project visible to `account_id`
    pub async fn get_project(&self, account_id: Uuid, project_id: Uuid) -> GateResult<Project> {
        match self.store.get_project(project_id).await? {
            Some(project) if project.account_id == account_id => Ok(project),
            _ => Err(GateError::NotFound("Project not found".to_string())),
        }
    }

    /// Reparents a project; cycles are rejected with `Conflict`
    pub async fn move_project(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        new_parent: Option<Uuid>,
    ) -> GateResult<Project> {
        self.get_project(account_id, project_id).await?;
        self.store.move_project(project_id, new_parent).await?;
        self.get_project(account_id, project_id).await
    }

    /// Adds or updates a project member within the account-role ceiling
    pub async fn add_project_member(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> GateResult<ProjectMember> {
        self.get_project(account_id, project_id).await?;

        let Some(account_role) = self.get_role(account_id, user_id).await? else {
            return Err(GateError::member_lookup_failed());
        };

        let ceiling = account_role.project_role_ceiling();
        if role.level() > ceiling.level() {
            return Err(GateError::Validation(format!(
                "Project role {} exceeds what account role {} allows ({})",
                role.as_str(),
                account_role.as_str(),
                ceiling.as_str()
            )));
        }

        let member = ProjectMember {
            project_id,
            user_id,
            role,
            created_at: Utc::now(),
        };
        Ok(self.store.upsert_project_member(member).await?)
    }

    pub async fn remove_project_member(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> GateResult<()> {
        self.get_project(account_id, project_id).await?;
        if !self.store.delete_project_member(project_id, user_id).await? {
            return Err(GateError::NotFound("Project member not found".to_string()));
        }
        Ok(())
    }

    /// All projects for admins/owners, otherwise those with a membership row
    pub async fn list_accessible_projects(
        &self,
        account_id: Uuid,
        user_id: Uuid,
    ) -> GateResult<Vec<Project>> {
        if self
            .has_role_at_least(account_id, user_id, AccountRole::Admin)
            .await?
        {
            return Ok(self.store.list_projects(account_id).await?);
        }

        Ok(self.store.list_member_projects(account_id, user_id).await?)
    }

    pub async fn list_projects(&self, account_id: Uuid) -> GateResult<Vec<Project>> {
        Ok(self.store.list_projects(account_id).await?)
    }
}

/// Parses an overrides document against the closed feature catalog
///
/// Unknown feature names and malformed entries are rejected by name.
pub fn parse_permission_overrides(value: &JsonValue) -> GateResult<PermissionOverrides> {
    let JsonValue::Object(map) = value else {
        return Err(GateError::Validation(
            "Permissions must be an object keyed by feature".to_string(),
        ));
    };

    let mut overrides = PermissionOverrides::new();
    for (key, entry) in map {
        let feature = Feature::parse(key)
            .ok_or_else(|| GateError::Validation(format!("Unknown feature: {key}")))?;
        let access: FeatureAccess = serde_json::from_value(entry.clone()).map_err(|_| {
            GateError::Validation(format!("Invalid permission entry for {key}, expected {{\"access\": bool}}"))
        })?;
        overrides.insert(feature, access);
    }

    Ok(overrides)
}

fn validate_name(name: &str, what: &str) -> GateResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GateError::Validation(format!("{what} is required")));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(GateError::Validation(format!(
            "{what} must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}
