/// Audit log endpoints
///
/// Both endpoints require role admin or higher (or the `audit:read` scope)
/// and the `audit_log` feature.
///
/// - `GET /v1/audit-logs?action=&resource_type=&user_id=&date_from=&date_to=&page=&per_page=`
/// - `GET /v1/audit-logs/export?format=csv|json` (same filters, no pagination)
///
/// Queries are audited as `audit.viewed` and exports as `audit.exported`.
/// Query parameters are only parsed once the caller is authorized.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tollgate_shared::audit::{self, ExportFormat};
use tollgate_shared::auth::actor::RequestContext;
use tollgate_shared::features::Feature;
use tollgate_shared::gate::{Executed, Operation};
use tollgate_shared::models::audit::{AuditFilter, AuditPage};
use tollgate_shared::models::member::AccountRole;
use tollgate_shared::{GateError, GateResult};
use uuid::Uuid;

use crate::{app::AppState, error::ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub user_id: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub format: Option<String>,
}

impl AuditLogQuery {
    fn filter(&self) -> AuditFilter {
        AuditFilter {
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            user_id: self.user_id,
            date_from: self.date_from,
            date_to: self.date_to,
        }
    }
}

fn query_params(params: Result<Query<AuditLogQuery>, QueryRejection>) -> GateResult<AuditLogQuery> {
    params
        .map(|Query(query)| query)
        .map_err(|rejection| GateError::Validation(rejection.body_text()))
}

fn read_operation(action: &str) -> Operation {
    Operation::new(action, "audit_log")
        .min_role(AccountRole::Admin)
        .feature(Feature::AuditLog)
        .scope("audit:read")
}

pub async fn query_audit_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    params: Result<Query<AuditLogQuery>, QueryRejection>,
) -> ApiResult<Json<AuditPage>> {
    let account_id = ctx.account_id();
    let audit_log = state.gate.audit_log();

    let page = state
        .gate
        .run(&ctx, read_operation("audit.viewed"), || async move {
            let query = query_params(params)?;
            let filter = query.filter();
            let page = audit_log
                .get_logs(account_id, &filter, query.page, query.per_page)
                .await?;
            let details = json!({
                "filter": filter,
                "page": page.page,
                "per_page": page.per_page,
            });
            Ok(Executed::new(page).with_details(details))
        })
        .await?;

    Ok(Json(page))
}

/// Streams every matching entry as a downloadable file
///
/// ```text
/// GET /v1/audit-logs/export?format=csv&action=api_key.created
///
/// Content-Type: text/csv; charset=utf-8
/// Content-Disposition: attachment; filename="audit-logs.csv"
/// ```
pub async fn export_audit_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    params: Result<Query<AuditLogQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let account_id = ctx.account_id();
    let audit_log = state.gate.audit_log();

    let (body, format) = state
        .gate
        .run(&ctx, read_operation("audit.exported"), || async move {
            let query = query_params(params)?;
            let requested = query.format.as_deref().unwrap_or("csv");
            let format = ExportFormat::parse(requested).ok_or_else(|| {
                GateError::Validation(format!("Unsupported export format: {requested}"))
            })?;

            let filter = query.filter();
            let entries = audit_log.export(account_id, &filter).await?;
            let body = audit::render_export(&entries, format)?;
            let details = json!({
                "format": format.extension(),
                "count": entries.len(),
                "filter": filter,
            });
            Ok(Executed::new((body, format)).with_details(details))
        })
        .await?;

    let disposition = format!("attachment; filename=\"audit-logs.{}\"", format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
