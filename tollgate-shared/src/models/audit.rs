/// Audit log entry model
///
/// Entries are append-only: created once, never updated, and deleted only by
/// the retention purge.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE audit_logs (
///     id UUID PRIMARY KEY,
///     account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
///     action TEXT NOT NULL,
///     resource_type TEXT NOT NULL,
///     resource_id TEXT,
///     user_id UUID,
///     api_key_id UUID,
///     details JSONB NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT audit_logs_single_actor CHECK (user_id IS NULL OR api_key_id IS NULL)
/// );
///
/// CREATE INDEX idx_audit_logs_account_created ON audit_logs (account_id, created_at DESC);
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Who triggered an audited action
///
/// Exactly one of user or API key; the enum makes "both" unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditActor {
    User(Uuid),
    ApiKey(Uuid),
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub api_key_id: Option<Uuid>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Builds a new entry stamped with the current time
    pub fn new(
        account_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: Option<String>,
        actor: Option<AuditActor>,
        details: Option<JsonValue>,
    ) -> Self {
        let (user_id, api_key_id) = match actor {
            Some(AuditActor::User(id)) => (Some(id), None),
            Some(AuditActor::ApiKey(id)) => (None, Some(id)),
            None => (None, None),
        };

        Self {
            id: Uuid::new_v4(),
            account_id,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            user_id,
            api_key_id,
            details: details.unwrap_or_else(|| JsonValue::Object(Default::default())),
            created_at: Utc::now(),
        }
    }

    pub fn actor(&self) -> Option<AuditActor> {
        match (self.user_id, self.api_key_id) {
            (Some(id), None) => Some(AuditActor::User(id)),
            (None, Some(id)) => Some(AuditActor::ApiKey(id)),
            _ => None,
        }
    }
}

/// Query filters; every field is optional and they combine with AND
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub user_id: Option<Uuid>,

    /// Inclusive lower bound
    pub date_from: Option<DateTime<Utc>>,

    /// Inclusive upper bound
    pub date_to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(resource_type) = &self.resource_type {
            if &entry.resource_type != resource_type {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if entry.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if entry.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if entry.created_at > to {
                return false;
            }
        }
        true
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Offset pagination request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Builds pagination from optional query values, clamped to `max_per_page`
    pub fn clamped(page: Option<u32>, per_page: Option<u32>, max_per_page: u32) -> Self {
        let max_per_page = max_per_page.max(1);
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, max_per_page),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

/// One page of audit results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub items: Vec<AuditLogEntry>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl AuditPage {
    pub fn new(items: Vec<AuditLogEntry>, total: u64, pagination: Pagination) -> Self {
        let per_page = u64::from(pagination.per_page.max(1));
        Self {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
            total_pages: total.div_ceil(per_page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_actor_columns() {
        let user = Uuid::new_v4();
        let entry = AuditLogEntry::new(
            Uuid::new_v4(),
            "member.invited",
            "member",
            None,
            Some(AuditActor::User(user)),
            None,
        );
        assert_eq!(entry.user_id, Some(user));
        assert!(entry.api_key_id.is_none());
        assert_eq!(entry.actor(), Some(AuditActor::User(user)));
        assert!(entry.details.is_object());
    }

    #[test]
    fn test_filter_matches() {
        let user = Uuid::new_v4();
        let entry = AuditLogEntry::new(
            Uuid::new_v4(),
            "api_key.created",
            "api_key",
            Some("tg_abc".into()),
            Some(AuditActor::User(user)),
            None,
        );

        assert!(AuditFilter::default().matches(&entry));
        assert!(AuditFilter {
            action: Some("api_key.created".into()),
            user_id: Some(user),
            ..Default::default()
        }
        .matches(&entry));
        assert!(!AuditFilter {
            resource_type: Some("member".into()),
            ..Default::default()
        }
        .matches(&entry));
        assert!(!AuditFilter {
            date_from: Some(Utc::now() + Duration::minutes(1)),
            ..Default::default()
        }
        .matches(&entry));
    }

    #[test]
    fn test_pagination_clamp() {
        let p = Pagination::clamped(Some(0), Some(5000), 100);
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, 100);

        let p = Pagination::clamped(None, None, 100);
        assert_eq!(p.per_page, DEFAULT_PAGE_SIZE);

        let p = Pagination::clamped(Some(3), Some(20), 100);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_total_pages() {
        let page = AuditPage::new(vec![], 101, Pagination::clamped(None, Some(50), 100));
        assert_eq!(page.total_pages, 3);

        let empty = AuditPage::new(vec![], 0, Pagination::default());
        assert_eq!(empty.total_pages, 0);
    }
}
