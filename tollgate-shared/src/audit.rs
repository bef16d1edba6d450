/// Append-only audit log
///
/// [`AuditLog`] writes one immutable entry per privileged action or denial
/// and serves filtered, newest-first queries and full exports. Entries are
/// never edited; [`AuditLog::purge_before`] (run by the maintenance worker)
/// is the only deletion path.
///
/// # Action names
///
/// Denials use [`ACCESS_DENIED`] and [`RATE_LIMITED`] with a `reason` in
/// `details`. Successful actions use dotted `resource.verb` names such as
/// `api_key.created` or `member.invited`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tollgate_shared::audit::AuditLog;
/// use tollgate_shared::models::audit::{AuditActor, AuditFilter};
/// use tollgate_shared::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), tollgate_shared::GateError> {
/// let audit = AuditLog::new(Arc::new(MemoryStore::new()), 100);
/// let account_id = Uuid::new_v4();
///
/// audit
///     .log(account_id, "member.invited", "member", None, None, Some(AuditActor::User(Uuid::new_v4())))
///     .await?;
///
/// let page = audit.get_logs(account_id, &AuditFilter::default(), None, None).await?;
/// assert_eq!(page.total, 1);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::GateResult;
use crate::models::audit::{AuditActor, AuditFilter, AuditLogEntry, AuditPage, Pagination};
use crate::store::Store;

pub const ACCESS_DENIED: &str = "access_denied";
pub const RATE_LIMITED: &str = "rate_limited";

/// Page-size ceiling used when none is configured
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

const CSV_HEADER: &str = "id,created_at,action,resource_type,resource_id,user_id,api_key_id,details";

/// Export representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Audit log service over a [`Store`]
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn Store>,
    max_page_size: u32,
}

impl AuditLog {
    pub fn new(store: Arc<dyn Store>, max_page_size: u32) -> Self {
        Self {
            store,
            max_page_size: max_page_size.max(1),
        }
    }

    /// Appends one entry and returns its id
    ///
    /// Returns only after the store has accepted the write.
    pub async fn log(
        &self,
        account_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: Option<String>,
        details: Option<JsonValue>,
        actor: Option<AuditActor>,
    ) -> GateResult<Uuid> {
        let entry = AuditLogEntry::new(account_id, action, resource_type, resource_id, actor, details);
        let id = entry.id;

        if let Err(e) = self.store.append_audit(entry).await {
            error!(account_id = %account_id, action = action, error = %e, "Failed to write audit entry");
            return Err(e.into());
        }

        Ok(id)
    }

    /// Filtered, newest-first page; `per_page` is clamped to the ceiling
    pub async fn get_logs(
        &self,
        account_id: Uuid,
        filter: &AuditFilter,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> GateResult<AuditPage> {
        let pagination = Pagination::clamped(page, per_page, self.max_page_size);
        let (items, total) = self
            .store
            .query_audit(account_id, filter, Some(pagination))
            .await?;

        Ok(AuditPage::new(items, total, pagination))
    }

    /// Every matching entry, newest first
    pub async fn export(
        &self,
        account_id: Uuid,
        filter: &AuditFilter,
    ) -> GateResult<Vec<AuditLogEntry>> {
        let (items, _) = self.store.query_audit(account_id, filter, None).await?;
        Ok(items)
    }

    /// Deletes entries older than `cutoff` across all accounts
    pub async fn purge_before(&self, cutoff: DateTime<Utc>) -> GateResult<u64> {
        let purged = self.store.purge_audit_before(cutoff).await?;
        info!(cutoff = %cutoff, purged = purged, "Audit retention purge completed");
        Ok(purged)
    }
}

/// Renders entries in the requested export format
pub fn render_export(entries: &[AuditLogEntry], format: ExportFormat) -> GateResult<String> {
    match format {
        ExportFormat::Csv => Ok(to_csv(entries)),
        ExportFormat::Json => serde_json::to_string_pretty(entries).map_err(|e| {
            crate::GateError::Validation(format!("Failed to serialize export: {e}"))
        }),
    }
}

/// CSV with a fixed header; `details` is embedded as compact JSON
pub fn to_csv(entries: &[AuditLogEntry]) -> String {
    let mut out = String::with_capacity(64 * (entries.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');

    for entry in entries {
        let fields = [
            entry.id.to_string(),
            entry.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            entry.action.clone(),
            entry.resource_type.clone(),
            entry.resource_id.clone().unwrap_or_default(),
            entry.user_id.map(|id| id.to_string()).unwrap_or_default(),
            entry.api_key_id.map(|id| id.to_string()).unwrap_or_default(),
            entry.details.to_string(),
        ];

        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Quotes a field when it contains a delimiter, quote or line break.
/// Leading formula characters are neutralized for spreadsheet safety.
fn csv_field(value: &str) -> String {
    let value = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{value}")
    } else {
        value.to_string()
    };

    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}
