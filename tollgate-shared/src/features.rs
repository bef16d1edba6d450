/// Static feature catalog and tier gating
///
/// Every product capability is a [`Feature`] with a minimum [`AccountTier`].
/// The catalog is closed: per-member overrides and availability maps are
/// keyed by `Feature`, so unknown feature names in requests are rejected at
/// deserialization time instead of being carried through. Overrides read
/// back from storage go through [`stored_overrides`], which drops them.
///
/// # Catalog
///
/// | feature | tier | name |
/// |---|---|---|
/// | links | free | Link Shortener |
/// | popups | free | Popups |
/// | contacts | free | Contacts |
/// | utm | free | UTM Builder |
/// | visitors | pro | Visitor Tracking |
/// | webhooks | pro | Webhooks |
/// | api_access | pro | API Access |
/// | audit_log | pro | Audit Log |
/// | projects | agency | Projects |
/// | custom_branding | agency | Custom Login Branding |
///
/// # Example
///
/// ```
/// use tollgate_shared::features::{available_features, Feature};
/// use tollgate_shared::models::account::AccountTier;
///
/// let features = available_features(AccountTier::Free);
/// assert!(features[&Feature::Links].available);
/// assert!(!features[&Feature::Visitors].available);
/// ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::account::AccountTier;
use crate::models::member::AccountRole;

/// A named capability gated by subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Links,
    Popups,
    Contacts,
    Utm,
    Visitors,
    Webhooks,
    ApiAccess,
    AuditLog,
    Projects,
    CustomBranding,
}

impl Feature {
    /// Every feature in the catalog
    pub const ALL: [Feature; 10] = [
        Feature::Links,
        Feature::Popups,
        Feature::Contacts,
        Feature::Utm,
        Feature::Visitors,
        Feature::Webhooks,
        Feature::ApiAccess,
        Feature::AuditLog,
        Feature::Projects,
        Feature::CustomBranding,
    ];

    /// Catalog key
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Links => "links",
            Feature::Popups => "popups",
            Feature::Contacts => "contacts",
            Feature::Utm => "utm",
            Feature::Visitors => "visitors",
            Feature::Webhooks => "webhooks",
            Feature::ApiAccess => "api_access",
            Feature::AuditLog => "audit_log",
            Feature::Projects => "projects",
            Feature::CustomBranding => "custom_branding",
        }
    }

    /// Parses a catalog key; unknown keys yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        Feature::ALL.into_iter().find(|f| f.as_str() == s)
    }

    /// Minimum tier at which the feature is available
    pub fn tier(&self) -> AccountTier {
        match self {
            Feature::Links | Feature::Popups | Feature::Contacts | Feature::Utm => {
                AccountTier::Free
            }
            Feature::Visitors | Feature::Webhooks | Feature::ApiAccess | Feature::AuditLog => {
                AccountTier::Pro
            }
            Feature::Projects | Feature::CustomBranding => AccountTier::Agency,
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Feature::Links => "Link Shortener",
            Feature::Popups => "Popups",
            Feature::Contacts => "Contacts",
            Feature::Utm => "UTM Builder",
            Feature::Visitors => "Visitor Tracking",
            Feature::Webhooks => "Webhooks",
            Feature::ApiAccess => "API Access",
            Feature::AuditLog => "Audit Log",
            Feature::Projects => "Projects",
            Feature::CustomBranding => "Custom Login Branding",
        }
    }

    /// Whether an account on `tier` can use this feature
    pub fn available_at(&self, tier: AccountTier) -> bool {
        self.tier().rank() <= tier.rank()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-feature access flag, used both for role defaults and member overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureAccess {
    pub access: bool,
}

impl FeatureAccess {
    pub const GRANTED: FeatureAccess = FeatureAccess { access: true };
    pub const DENIED: FeatureAccess = FeatureAccess { access: false };
}

/// Member-level overrides, keyed by catalog feature
pub type PermissionOverrides = BTreeMap<Feature, FeatureAccess>;

/// One row of the tier availability table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureAvailability {
    pub available: bool,
    pub name: &'static str,
    pub tier: AccountTier,
}

/// Default access for every catalog feature given a role
///
/// Owners and admins get every feature; members and viewers only the
/// free-tier ones.
pub fn default_permissions_for_role(role: AccountRole) -> BTreeMap<Feature, FeatureAccess> {
    let full = matches!(role, AccountRole::Owner | AccountRole::Admin);

    Feature::ALL
        .into_iter()
        .map(|feature| {
            let access = full || feature.tier() == AccountTier::Free;
            (feature, FeatureAccess { access })
        })
        .collect()
}

/// Availability of every catalog feature at a tier
pub fn available_features(tier: AccountTier) -> BTreeMap<Feature, FeatureAvailability> {
    Feature::ALL
        .into_iter()
        .map(|feature| {
            (
                feature,
                FeatureAvailability {
                    available: feature.available_at(tier),
                    name: feature.display_name(),
                    tier: feature.tier(),
                },
            )
        })
        .collect()
}

/// Overrides as persisted, keeping only entries that still parse
///
/// Returns the kept overrides and the keys that were dropped: features
/// removed from the catalog or entries with a malformed flag. A dropped
/// entry falls back to the role default.
pub fn stored_overrides(value: &JsonValue) -> (PermissionOverrides, Vec<String>) {
    let Some(entries) = value.as_object() else {
        return (PermissionOverrides::new(), vec![value.to_string()]);
    };

    let mut overrides = PermissionOverrides::new();
    let mut dropped = Vec::new();
    for (key, grant) in entries {
        let parsed = Feature::parse(key)
            .zip(serde_json::from_value::<FeatureAccess>(grant.clone()).ok());
        match parsed {
            Some((feature, grant)) => {
                overrides.insert(feature, grant);
            }
            None => dropped.push(key.clone()),
        }
    }
    (overrides, dropped)
}

/// Effective permission from already-loaded inputs
///
/// Precedence: tier gate, then member override, then role default.
pub fn resolve_permission(
    tier: AccountTier,
    role: AccountRole,
    overrides: &PermissionOverrides,
    feature: Feature,
) -> bool {
    if !feature.available_at(tier) {
        return false;
    }

    if let Some(grant) = overrides.get(&feature) {
        return grant.access;
    }

    default_permissions_for_role(role)
        .get(&feature)
        .map(|grant| grant.access)
        .unwrap_or(false)
}
