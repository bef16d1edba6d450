/// Account membership model with RBAC roles
///
/// # Schema
///
/// ```sql
/// CREATE TABLE account_members (
///     account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role TEXT NOT NULL,
///     permissions JSONB NOT NULL DEFAULT '{}',
///     joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     accepted_at TIMESTAMPTZ,
///     PRIMARY KEY (account_id, user_id)
/// );
///
/// CREATE UNIQUE INDEX account_members_one_owner
///     ON account_members (account_id) WHERE role = 'owner';
/// ```
///
/// # Roles
///
/// - **owner**: Everything an admin can do, plus ownership transfer
/// - **admin**: Manage members, API keys, projects and settings
/// - **member**: Use free-tier features by default
/// - **viewer**: Read-only
///
/// Ordering is `viewer < member < admin = owner`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::PermissionOverrides;
use crate::models::project::ProjectRole;

/// RBAC roles for account memberships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl AccountRole {
    /// Converts role to string for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Owner => "owner",
            AccountRole::Admin => "admin",
            AccountRole::Member => "member",
            AccountRole::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(AccountRole::Owner),
            "admin" => Some(AccountRole::Admin),
            "member" => Some(AccountRole::Member),
            "viewer" => Some(AccountRole::Viewer),
            _ => None,
        }
    }

    /// Numeric level for comparison; owner and admin share a level
    pub fn level(&self) -> u8 {
        match self {
            AccountRole::Owner | AccountRole::Admin => 3,
            AccountRole::Member => 2,
            AccountRole::Viewer => 1,
        }
    }

    /// Checks if this role meets the required level
    pub fn has_permission(&self, required: AccountRole) -> bool {
        self.level() >= required.level()
    }

    /// Highest project role this account role may hold
    pub fn project_role_ceiling(&self) -> ProjectRole {
        match self {
            AccountRole::Owner | AccountRole::Admin => ProjectRole::Admin,
            AccountRole::Member => ProjectRole::Member,
            AccountRole::Viewer => ProjectRole::Viewer,
        }
    }
}

/// Account membership record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountMember {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub role: AccountRole,

    /// Per-feature overrides; absent features fall back to the role default
    #[serde(default)]
    pub permissions: PermissionOverrides,

    pub joined_at: DateTime<Utc>,

    /// `None` while invited but not yet activated
    pub accepted_at: Option<DateTime<Utc>>,
}

impl AccountMember {
    /// Builds a fresh membership row
    pub fn new(account_id: Uuid, user_id: Uuid, role: AccountRole) -> Self {
        Self {
            account_id,
            user_id,
            role,
            permissions: PermissionOverrides::new(),
            joined_at: Utc::now(),
            accepted_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.accepted_at.is_none()
    }
}
