/// Feature catalog for the caller's account
///
/// ```text
/// GET /v1/features
/// ```
///
/// ```json
/// {
///   "tier": "free",
///   "features": { "links": { "available": true, "name": "Link Shortener", "tier": "free" }, ... },
///   "permissions": { "links": true, "visitors": false, ... }
/// }
/// ```

use std::collections::BTreeMap;

use axum::{extract::State, Extension, Json};
use serde::Serialize;
use tollgate_shared::auth::actor::{Actor, RequestContext};
use tollgate_shared::features::{self, Feature, FeatureAvailability};
use tollgate_shared::gate::{Executed, Operation};
use tollgate_shared::models::account::AccountTier;

use crate::{app::AppState, error::ApiResult};

#[derive(Debug, Serialize)]
pub struct FeaturesResponse {
    pub tier: AccountTier,
    pub features: BTreeMap<Feature, FeatureAvailability>,

    /// Effective access for a session user; API keys only see tier availability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<Feature, bool>>,
}

pub async fn get_features(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<FeaturesResponse>> {
    let account_id = ctx.account_id();
    let op = Operation::new("features.viewed", "account").scope("members:read");

    let resolver = state.gate.resolver();
    let actor = &ctx.actor;
    let response = state
        .gate
        .run(&ctx, op, || async move {
            let account = resolver.get_account(account_id).await?;
            let permissions = match actor {
                Actor::User { user_id, .. } => {
                    Some(resolver.effective_permissions(account_id, *user_id).await?)
                }
                Actor::ApiKey { .. } => None,
            };

            Ok(Executed::new(FeaturesResponse {
                tier: account.tier,
                features: features::available_features(account.tier),
                permissions,
            }))
        })
        .await?;

    Ok(Json(response))
}
