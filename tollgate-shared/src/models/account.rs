/// Account model
///
/// An account is the tenant: every member, project, API key and audit entry
/// belongs to exactly one account, and the account's tier decides which
/// catalog features are available at all.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE accounts (
///     id UUID PRIMARY KEY,
///     name VARCHAR(255) NOT NULL,
///     tier TEXT NOT NULL DEFAULT 'free',
///     status TEXT NOT NULL DEFAULT 'active',
///     settings JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountTier {
    Free,
    Pro,
    Agency,
}

impl AccountTier {
    /// Converts tier to string for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountTier::Free => "free",
            AccountTier::Pro => "pro",
            AccountTier::Agency => "agency",
        }
    }

    /// Parses a tier name, `None` when unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(AccountTier::Free),
            "pro" => Some(AccountTier::Pro),
            "agency" => Some(AccountTier::Agency),
            _ => None,
        }
    }

    /// Parses a stored tier name, treating anything unrecognized as `free`
    pub fn parse_or_free(s: &str) -> Self {
        Self::parse(s).unwrap_or(AccountTier::Free)
    }

    /// Ordering used for tier gating (free < pro < agency)
    pub fn rank(&self) -> u8 {
        match self {
            AccountTier::Free => 0,
            AccountTier::Pro => 1,
            AccountTier::Agency => 2,
        }
    }
}

/// Lifecycle status; suspended accounts are denied every protected operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
        }
    }

    /// Unknown stored values are treated as suspended
    pub fn parse_or_suspended(s: &str) -> Self {
        match s {
            "active" => AccountStatus::Active,
            _ => AccountStatus::Suspended,
        }
    }
}

/// Custom login page branding (agency tier)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginPageBranding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
}

impl LoginPageBranding {
    /// Checks field shapes: https logo URL, `#rrggbb` color, short headline
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.logo_url {
            if !url.starts_with("https://") || url.len() > 2048 {
                return Err("logo_url must be an https URL".to_string());
            }
        }

        if let Some(color) = &self.primary_color {
            let hex = color.strip_prefix('#').unwrap_or("");
            if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err("primary_color must look like #1a2b3c".to_string());
            }
        }

        if let Some(headline) = &self.headline {
            if headline.chars().count() > 120 {
                return Err("headline must be at most 120 characters".to_string());
            }
        }

        Ok(())
    }
}

/// Account settings document
///
/// Only `login_page` is typed; everything else is kept as opaque JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_page: Option<LoginPageBranding>,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl AccountSettings {
    /// Applies a partial update; top-level keys in `patch` replace existing ones
    pub fn merge(&mut self, patch: AccountSettings) {
        if patch.login_page.is_some() {
            self.login_page = patch.login_page;
        }
        for (key, value) in patch.extra {
            self.extra.insert(key, value);
        }
    }
}

/// Account model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub tier: AccountTier,
    pub status: AccountStatus,
    pub settings: AccountSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Input for creating a new account together with its owner membership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub name: String,

    #[serde(default = "default_tier")]
    pub tier: AccountTier,

    /// User who becomes the sole owner
    pub owner_id: Uuid,
}

fn default_tier() -> AccountTier {
    AccountTier::Free
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse() {
        assert_eq!(AccountTier::parse("pro"), Some(AccountTier::Pro));
        assert_eq!(AccountTier::parse("gold"), None);
        assert_eq!(AccountTier::parse_or_free("gold"), AccountTier::Free);
        assert!(AccountTier::Agency.rank() > AccountTier::Pro.rank());
    }

    #[test]
    fn test_status_fails_closed() {
        assert_eq!(
            AccountStatus::parse_or_suspended("active"),
            AccountStatus::Active
        );
        assert_eq!(
            AccountStatus::parse_or_suspended("archived"),
            AccountStatus::Suspended
        );
    }

    #[test]
    fn test_settings_keep_unknown_keys() {
        let raw = r##"{"timezone":"UTC","login_page":{"headline":"Hi","primary_color":"#aabbcc"}}"##;
        let settings: AccountSettings = serde_json::from_str(raw).unwrap();

        assert_eq!(settings.extra.get("timezone"), Some(&JsonValue::from("UTC")));
        assert_eq!(
            settings.login_page.as_ref().and_then(|b| b.headline.as_deref()),
            Some("Hi")
        );

        let back = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["timezone"], "UTC");
        assert_eq!(back["login_page"]["primary_color"], "#aabbcc");
    }

    #[test]
    fn test_branding_validation() {
        let ok = LoginPageBranding {
            logo_url: Some("https://cdn.example.com/logo.png".into()),
            primary_color: Some("#1A2b3c".into()),
            headline: Some("Welcome".into()),
        };
        assert!(ok.validate().is_ok());

        let bad_url = LoginPageBranding {
            logo_url: Some("javascript:alert(1)".into()),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());

        let bad_color = LoginPageBranding {
            primary_color: Some("red".into()),
            ..Default::default()
        };
        assert!(bad_color.validate().is_err());
    }

    #[test]
    fn test_settings_merge() {
        let mut settings: AccountSettings =
            serde_json::from_str(r#"{"timezone":"UTC","locale":"en"}"#).unwrap();
        let patch: AccountSettings =
            serde_json::from_str(r#"{"locale":"de","login_page":{"headline":"Hallo"}}"#).unwrap();

        settings.merge(patch);

        assert_eq!(settings.extra["timezone"], "UTC");
        assert_eq!(settings.extra["locale"], "de");
        assert!(settings.login_page.is_some());
    }
}
