/// Account endpoints
///
/// - `GET /v1/account` - Account summary (viewer+)
/// - `PATCH /v1/account/settings` - Merge settings (admin+; branding needs `custom_branding`)
/// - `PUT /v1/account/tier` - Change tier (owner only)
/// - `POST /v1/account/transfer-ownership` - Hand ownership to another member (owner only)

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tollgate_shared::auth::actor::RequestContext;
use tollgate_shared::features::Feature;
use tollgate_shared::gate::{Executed, Operation};
use tollgate_shared::models::account::{Account, AccountSettings, AccountTier};
use tollgate_shared::models::member::AccountRole;
use tollgate_shared::GateError;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{json_body, ApiResult},
};

#[derive(Debug, Deserialize)]
pub struct ChangeTierRequest {
    pub tier: AccountTier,
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnershipRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TransferOwnershipResponse {
    pub owner_id: Uuid,
    pub previous_owner_id: Uuid,
}

pub async fn get_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Account>> {
    let account_id = ctx.account_id();
    let op = Operation::new("account.viewed", "account").resource_id(account_id);

    let resolver = state.gate.resolver();
    let account = state
        .gate
        .run(&ctx, op, || async move {
            Ok(Executed::new(resolver.get_account(account_id).await?))
        })
        .await?;

    Ok(Json(account))
}

/// Merges a settings patch
///
/// ```text
/// PATCH /v1/account/settings
///
/// { "login_page": { "logo_url": "https://...", "primary_color": "#112233", "headline": "Welcome" } }
/// ```
///
/// Unknown top-level keys are stored and returned untouched.
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<AccountSettings>, JsonRejection>,
) -> ApiResult<Json<AccountSettings>> {
    let account_id = ctx.account_id();
    let mut op = Operation::new("account.settings_updated", "account")
        .resource_id(account_id)
        .min_role(AccountRole::Admin);
    if matches!(&payload, Ok(Json(patch)) if patch.login_page.is_some()) {
        op = op.feature(Feature::CustomBranding);
    }

    let resolver = state.gate.resolver();
    let settings = state
        .gate
        .run(&ctx, op, || async move {
            let patch = json_body(payload)?;
            let keys: Vec<String> = patch
                .login_page
                .iter()
                .map(|_| "login_page".to_string())
                .chain(patch.extra.keys().cloned())
                .collect();

            let settings = resolver.update_settings(account_id, patch).await?;
            Ok(Executed::new(settings).with_details(json!({ "keys": keys })))
        })
        .await?;

    Ok(Json(settings))
}

pub async fn change_tier(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<ChangeTierRequest>, JsonRejection>,
) -> ApiResult<Json<Account>> {
    let account_id = ctx.account_id();
    let op = Operation::new("account.tier_changed", "account")
        .resource_id(account_id)
        .owner_only();

    let resolver = state.gate.resolver();
    let account = state
        .gate
        .run(&ctx, op, || async move {
            let req = json_body(payload)?;
            let before = resolver.get_account(account_id).await?;
            resolver.set_tier(account_id, req.tier).await?;
            let after = resolver.get_account(account_id).await?;

            Ok(Executed::new(after).with_details(json!({
                "from": before.tier,
                "to": req.tier,
            })))
        })
        .await?;

    Ok(Json(account))
}

pub async fn transfer_ownership(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<TransferOwnershipRequest>, JsonRejection>,
) -> ApiResult<Json<TransferOwnershipResponse>> {
    let account_id = ctx.account_id();
    let op = Operation::new("account.ownership_transferred", "account")
        .resource_id(account_id)
        .owner_only();

    let resolver = state.gate.resolver();
    let actor = &ctx.actor;
    let transfer = state
        .gate
        .run(&ctx, op, || async move {
            let target = json_body(payload)?.user_id;
            // Owner-only operations never admit API keys
            let current_owner = actor.user_id().ok_or_else(|| {
                GateError::Forbidden("Only the account owner can do this".to_string())
            })?;
            resolver
                .transfer_ownership(account_id, current_owner, target)
                .await?;
            Ok(Executed::new(TransferOwnershipResponse {
                owner_id: target,
                previous_owner_id: current_owner,
            })
            .with_details(json!({
                "from": current_owner,
                "to": target,
            })))
        })
        .await?;

    Ok(Json(transfer))
}
