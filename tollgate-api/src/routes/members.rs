/// Team membership endpoints
///
/// - `GET /v1/members` - List members (viewer+, or `members:read`)
/// - `POST /v1/members` - Invite by email (admin+, rate limited)
/// - `POST /v1/members/accept` - Accept a pending invitation (the invitee)
/// - `PATCH /v1/members/:user_id` - Change role (admin+)
/// - `PUT /v1/members/:user_id/permissions` - Replace feature overrides (admin+)
/// - `DELETE /v1/members/:user_id` - Remove member (admin+)
///
/// Invitations to unknown emails and to existing members fail with the same
/// generic message, and both still count against the invite limit. Request
/// bodies are only parsed once the caller is authorized.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tollgate_shared::auth::actor::RequestContext;
use tollgate_shared::auth::authorization::parse_permission_overrides;
use tollgate_shared::gate::{Executed, Operation};
use tollgate_shared::models::member::{AccountMember, AccountRole};
use tollgate_shared::GateError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{json_body, validate_request, ApiResult},
};

#[derive(Debug, Deserialize, Validate)]
pub struct InviteMemberRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,

    pub role: AccountRole,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: AccountRole,
}

#[derive(Debug, Serialize)]
pub struct ListMembersResponse {
    pub members: Vec<AccountMember>,
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<ListMembersResponse>> {
    let account_id = ctx.account_id();
    let op = Operation::new("member.listed", "member").scope("members:read");

    let resolver = state.gate.resolver();
    let members = state
        .gate
        .run(&ctx, op, || async move {
            let members = resolver.list_members(account_id).await?;
            let details = json!({ "count": members.len() });
            Ok(Executed::new(members).with_details(details))
        })
        .await?;

    Ok(Json(ListMembersResponse { members }))
}

/// Invites an existing user by email
///
/// ```text
/// POST /v1/members
///
/// { "email": "teammate@example.com", "role": "member" }
/// ```
pub async fn invite_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<InviteMemberRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AccountMember>)> {
    let account_id = ctx.account_id();
    let op = Operation::new("member.invited", "member")
        .min_role(AccountRole::Admin)
        .rate_limit(state.gate.invite_rule());

    let resolver = state.gate.resolver();
    let member = state
        .gate
        .run(&ctx, op, || async move {
            let req = json_body(payload)?;
            validate_request(&req)?;
            let member = resolver.invite_member(account_id, &req.email, req.role).await?;
            Ok(Executed::new(member.clone())
                .with_resource_id(member.user_id)
                .with_details(json!({ "role": member.role })))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn accept_invite(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<AccountMember>> {
    let account_id = ctx.account_id();
    let op = Operation::new("member.accepted", "member");

    let resolver = state.gate.resolver();
    let actor = &ctx.actor;
    let member = state
        .gate
        .run(&ctx, op, || async move {
            let user_id = actor.user_id().ok_or_else(|| {
                GateError::Forbidden("This operation requires a user session".to_string())
            })?;
            let member = resolver.accept_invite(account_id, user_id).await?;
            Ok(Executed::new(member).with_resource_id(user_id))
        })
        .await?;

    Ok(Json(member))
}

pub async fn change_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> ApiResult<Json<AccountMember>> {
    let account_id = ctx.account_id();
    let op = Operation::new("member.role_changed", "member")
        .resource_id(user_id)
        .min_role(AccountRole::Admin);

    let resolver = state.gate.resolver();
    let member = state
        .gate
        .run(&ctx, op, || async move {
            let req = json_body(payload)?;
            let previous = resolver
                .get_role(account_id, user_id)
                .await?
                .ok_or_else(|| GateError::NotFound("Member not found".to_string()))?;
            let member = resolver.change_role(account_id, user_id, req.role).await?;
            Ok(Executed::new(member).with_details(json!({
                "from": previous,
                "to": req.role,
            })))
        })
        .await?;

    Ok(Json(member))
}

/// Replaces a member's feature overrides
///
/// ```text
/// PUT /v1/members/:user_id/permissions
///
/// { "visitors": { "access": false }, "links": { "access": true } }
/// ```
///
/// Keys must be catalog features; anything else is rejected by name.
pub async fn set_permissions(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<Uuid>,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> ApiResult<Json<AccountMember>> {
    let account_id = ctx.account_id();
    let op = Operation::new("member.permissions_updated", "member")
        .resource_id(user_id)
        .min_role(AccountRole::Admin);

    let resolver = state.gate.resolver();
    let member = state
        .gate
        .run(&ctx, op, || async move {
            let overrides = parse_permission_overrides(&json_body(payload)?)?;
            let member = resolver
                .set_permission_overrides(account_id, user_id, overrides)
                .await?;
            let details = json!({ "permissions": member.permissions });
            Ok(Executed::new(member).with_details(details))
        })
        .await?;

    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let account_id = ctx.account_id();
    let op = Operation::new("member.removed", "member")
        .resource_id(user_id)
        .min_role(AccountRole::Admin);

    let resolver = state.gate.resolver();
    state
        .gate
        .run(&ctx, op, || async move {
            resolver.remove_member(account_id, user_id).await?;
            Ok(Executed::new(()))
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
