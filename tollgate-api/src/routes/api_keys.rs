/// API key management endpoints
///
/// All endpoints require a user session with role admin or higher; API keys
/// cannot manage API keys. Keys issued by the account owner can only be
/// revoked or regenerated by the owner.
///
/// # Endpoints
///
/// - `GET /v1/api-keys` - List keys (masked)
/// - `POST /v1/api-keys` - Create key (`api_access` feature)
/// - `POST /v1/api-keys/:key_id/revoke` - Revoke key
/// - `POST /v1/api-keys/:key_id/regenerate` - Revoke and reissue (`api_access` feature)

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tollgate_shared::auth::actor::{Actor, RequestContext};
use tollgate_shared::credentials::{IssuedKey, NewApiKey};
use tollgate_shared::features::Feature;
use tollgate_shared::gate::{Executed, Operation};
use tollgate_shared::models::api_key::ApiKey;
use tollgate_shared::models::member::AccountRole;
use tollgate_shared::GateError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{json_body, validate_request, ApiResult},
};

/// Create API key request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    /// Exact scope names from the catalog, e.g. `["links:read"]`
    #[validate(length(min = 1, message = "At least one scope is required"))]
    pub scopes: Vec<String>,

    pub expires_at: Option<DateTime<Utc>>,
}

/// Issued key; the only response that ever carries the secret
#[derive(Debug, Serialize)]
pub struct IssuedApiKeyResponse {
    pub key_id: String,

    /// `key_id:secret`, shown once
    pub key: String,

    pub name: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<IssuedKey> for IssuedApiKeyResponse {
    fn from(issued: IssuedKey) -> Self {
        let key = issued.credential();
        let record = issued.record;
        Self {
            key_id: record.key_id,
            key,
            name: record.name,
            scopes: record.scopes,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

/// API key list item (masked)
#[derive(Debug, Serialize)]
pub struct ApiKeyListItem {
    pub key_id: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyListItem {
    fn from(key: ApiKey) -> Self {
        Self {
            key_id: key.key_id,
            name: key.name,
            scopes: key.scopes,
            created_at: key.created_at,
            expires_at: key.expires_at,
            revoked_at: key.revoked_at,
            last_used_at: key.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListApiKeysResponse {
    pub keys: Vec<ApiKeyListItem>,
}

#[derive(Debug, Serialize)]
pub struct RevokeApiKeyResponse {
    /// `false` when the key was already revoked
    pub revoked: bool,
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<ListApiKeysResponse>> {
    let account_id = ctx.account_id();
    let op = Operation::new("api_key.listed", "api_key").min_role(AccountRole::Admin);

    let credentials = state.gate.credentials();
    let keys = state
        .gate
        .run(&ctx, op, || async move {
            let keys = credentials.list(account_id).await?;
            let details = json!({ "count": keys.len() });
            let items: Vec<ApiKeyListItem> = keys.into_iter().map(ApiKeyListItem::from).collect();
            Ok(Executed::new(items).with_details(details))
        })
        .await?;

    Ok(Json(ListApiKeysResponse { keys }))
}

/// Create API key
///
/// ```text
/// POST /v1/api-keys
/// Cookie: session=<token>
///
/// {
///   "name": "Zapier",
///   "scopes": ["links:read", "links:write"],
///   "expires_at": "2027-01-01T00:00:00Z"
/// }
/// ```
///
/// # Errors
///
/// - `403 forbidden`: not admin, tier lacks `api_access`, or called with an API key
/// - `422 validation_error`: blank name, no scopes, unknown scope, past expiry
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<CreateApiKeyRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<IssuedApiKeyResponse>)> {
    let account_id = ctx.account_id();
    let op = Operation::new("api_key.created", "api_key")
        .min_role(AccountRole::Admin)
        .feature(Feature::ApiAccess);

    let credentials = state.gate.credentials();
    let actor = &ctx.actor;
    let issued = state
        .gate
        .run(&ctx, op, || async move {
            let req = json_body(payload)?;
            validate_request(&req)?;
            let actor_id = session_user(actor)?;
            let issued = credentials
                .create(
                    account_id,
                    actor_id,
                    NewApiKey {
                        name: req.name,
                        scopes: req.scopes,
                        expires_at: req.expires_at,
                    },
                )
                .await?;

            let details = json!({
                "name": issued.record.name,
                "scopes": issued.record.scopes,
                "expires_at": issued.record.expires_at,
            });
            let key_id = issued.record.key_id.clone();
            Ok(Executed::new(issued)
                .with_resource_id(key_id)
                .with_details(details))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(issued.into())))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(key_id): Path<String>,
) -> ApiResult<Json<RevokeApiKeyResponse>> {
    let account_id = ctx.account_id();
    let op = key_operation(&state, "api_key.revoked", account_id, &key_id).await?;

    let credentials = state.gate.credentials();
    let actor = &ctx.actor;
    let revoked = state
        .gate
        .run(&ctx, op, || async move {
            let actor_id = session_user(actor)?;
            let revoked = credentials.revoke(account_id, &key_id, actor_id).await?;
            Ok(Executed::new(revoked).with_details(json!({ "changed": revoked })))
        })
        .await?;

    Ok(Json(RevokeApiKeyResponse { revoked }))
}

/// Revokes a key and issues a replacement with the same name, scopes and expiry
///
/// The old credential stops validating immediately.
pub async fn regenerate_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(key_id): Path<String>,
) -> ApiResult<Json<IssuedApiKeyResponse>> {
    let account_id = ctx.account_id();
    let op = key_operation(&state, "api_key.regenerated", account_id, &key_id)
        .await?
        .feature(Feature::ApiAccess);

    let credentials = state.gate.credentials();
    let actor = &ctx.actor;
    let issued = state
        .gate
        .run(&ctx, op, || async move {
            let actor_id = session_user(actor)?;
            let issued = credentials.regenerate(account_id, &key_id, actor_id).await?;
            let details = json!({
                "previous_key_id": key_id,
                "key_id": issued.record.key_id,
            });
            Ok(Executed::new(issued).with_details(details))
        })
        .await?;

    Ok(Json(issued.into()))
}

/// Admin operation on one key, restricted to the owner for keys the owner issued
async fn key_operation(
    state: &AppState,
    action: &str,
    account_id: Uuid,
    key_id: &str,
) -> ApiResult<Operation> {
    let op = Operation::new(action, "api_key")
        .resource_id(key_id)
        .min_role(AccountRole::Admin);

    if state.gate.credentials().issued_by_owner(account_id, key_id).await? {
        return Ok(op.owner_only());
    }
    Ok(op)
}

/// The gate rejects API-key actors for these operations before the body runs
fn session_user(actor: &Actor) -> Result<Uuid, GateError> {
    actor
        .user_id()
        .ok_or_else(|| GateError::Forbidden("This operation requires a user session".to_string()))
}
