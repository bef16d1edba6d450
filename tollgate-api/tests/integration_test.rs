/// HTTP integration tests over in-memory backends
///
/// Run with: cargo test -p tollgate-api --test integration_test

mod common;

use axum::http::{header, Method, StatusCode};
use common::{Auth, TestContext, TEST_SECRET};
use serde_json::json;
use tollgate_api::config::Config;
use tollgate_shared::gate::GateConfig;
use tollgate_shared::models::account::AccountTier;
use tollgate_shared::models::member::AccountRole;

async fn create_key(ctx: &TestContext, token: &str, scopes: &[&str]) -> (String, String) {
    let response = ctx
        .request(
            Method::POST,
            "/v1/api-keys",
            Auth::Session(token),
            Some(json!({ "name": "Integration", "scopes": scopes })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);

    let body = response.json();
    (
        body["key_id"].as_str().unwrap().to_string(),
        body["key"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_health_is_public() {
    let ctx = TestContext::new(AccountTier::Free).await;

    let response = ctx.request(Method::GET, "/health", Auth::None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "healthy");
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_authentication_required() {
    let ctx = TestContext::new(AccountTier::Pro).await;

    let response = ctx.request(Method::GET, "/v1/account", Auth::None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["error"], "unauthorized");

    let response = ctx
        .request(Method::GET, "/v1/account", Auth::Session("not-a-jwt"), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = ctx
        .request(Method::GET, "/v1/account", Auth::Bearer("tg_nope:nope"), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["message"], "Invalid API key");
}

#[tokio::test]
async fn test_viewer_cannot_create_api_key() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let (_, viewer_token) = ctx.member(AccountRole::Viewer).await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/api-keys",
            Auth::Session(&viewer_token),
            Some(json!({ "name": "Nope", "scopes": ["links:read"] })),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.json()["error"], "forbidden");

    let denied = ctx.audit_entries("access_denied").await;
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].details["reason"], "insufficient_role");
    assert_eq!(denied[0].details["attempted_action"], "api_key.created");
    assert!(ctx.audit_entries("api_key.created").await.is_empty());
}

#[tokio::test]
async fn test_denied_caller_with_invalid_body_is_forbidden() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let (viewer, viewer_token) = ctx.member(AccountRole::Viewer).await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/api-keys",
            Auth::Session(&viewer_token),
            Some(json!({ "name": "" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN, "{}", response.text);

    let response = ctx
        .request(
            Method::POST,
            "/v1/members",
            Auth::Session(&viewer_token),
            Some(json!({ "email": "not-an-email", "role": "admin" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN, "{}", response.text);

    let response = ctx
        .request(
            Method::PUT,
            &format!("/v1/members/{}/permissions", ctx.owner.id),
            Auth::Session(&viewer_token),
            Some(json!({ "no_such_feature": "maybe" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN, "{}", response.text);

    let response = ctx
        .request(
            Method::GET,
            "/v1/audit-logs/export?format=xml",
            Auth::Session(&viewer_token),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN, "{}", response.text);

    let denied = ctx.audit_entries("access_denied").await;
    let attempted: Vec<_> = denied
        .iter()
        .map(|entry| entry.details["attempted_action"].as_str().unwrap())
        .collect();
    assert_eq!(
        attempted,
        [
            "audit.exported",
            "member.permissions_updated",
            "member.invited",
            "api_key.created",
        ]
    );
    assert!(denied.iter().all(|entry| entry.user_id == Some(viewer.id)));
}

#[tokio::test]
async fn test_invalid_body_from_authorized_caller_is_unprocessable() {
    let ctx = TestContext::new(AccountTier::Pro).await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/api-keys",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "name": "" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["error"], "validation_error");

    let response = ctx
        .request(
            Method::POST,
            "/v1/api-keys",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "name": "", "scopes": [] })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<_> = response.json()["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|detail| detail["field"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(fields, ["name", "scopes"]);

    assert!(ctx.audit_entries("access_denied").await.is_empty());
    assert!(ctx.audit_entries("api_key.created").await.is_empty());
}

#[tokio::test]
async fn test_successful_reads_are_audited() {
    let ctx = TestContext::new(AccountTier::Pro).await;

    let response = ctx
        .request(Method::GET, "/v1/api-keys", Auth::Session(&ctx.owner_token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = ctx
        .request(
            Method::GET,
            "/v1/audit-logs?action=api_key.listed",
            Auth::Session(&ctx.owner_token),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let listed = ctx.audit_entries("api_key.listed").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].user_id, Some(ctx.owner.id));
    assert_eq!(listed[0].details["count"], 0);

    let viewed = ctx.audit_entries("audit.viewed").await;
    assert_eq!(viewed.len(), 1);
    assert_eq!(viewed[0].user_id, Some(ctx.owner.id));
}

#[tokio::test]
async fn test_admin_cannot_manage_owner_keys() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let (_, admin_token) = ctx.member(AccountRole::Admin).await;
    let (owner_key_id, owner_key) = create_key(&ctx, &ctx.owner_token, &["members:read"]).await;
    let (admin_key_id, _) = create_key(&ctx, &admin_token, &["members:read"]).await;

    for action in ["regenerate", "revoke"] {
        let response = ctx
            .request(
                Method::POST,
                &format!("/v1/api-keys/{owner_key_id}/{action}"),
                Auth::Session(&admin_token),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::FORBIDDEN, "{}", response.text);
    }

    let denied = ctx.audit_entries("access_denied").await;
    assert_eq!(denied.len(), 2);
    assert!(denied.iter().all(|entry| entry.details["reason"] == "owner_required"));
    assert!(denied
        .iter()
        .all(|entry| entry.resource_id.as_deref() == Some(owner_key_id.as_str())));

    // The owner's key still works
    let response = ctx
        .request(Method::GET, "/v1/members", Auth::Bearer(&owner_key), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);

    // Admins still manage keys they issued themselves
    let response = ctx
        .request(
            Method::POST,
            &format!("/v1/api-keys/{admin_key_id}/revoke"),
            Auth::Session(&admin_token),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.json()["revoked"], true);

    let response = ctx
        .request(
            Method::POST,
            &format!("/v1/api-keys/{owner_key_id}/revoke"),
            Auth::Session(&ctx.owner_token),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.json()["revoked"], true);
}

#[tokio::test]
async fn test_api_key_lifecycle_over_http() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let (key_id, key) = create_key(&ctx, &ctx.owner_token, &["members:read"]).await;

    let response = ctx
        .request(Method::GET, "/v1/members", Auth::Bearer(&key), None)
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.json()["members"].as_array().unwrap().len(), 1);

    // Listing is masked
    let response = ctx
        .request(Method::GET, "/v1/api-keys", Auth::Session(&ctx.owner_token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let secret = key.split_once(':').unwrap().1;
    assert!(!response.text.contains(secret));
    assert!(!response.text.contains("secret_hash"));
    assert_eq!(response.json()["keys"][0]["key_id"], key_id.as_str());

    let created = ctx.audit_entries("api_key.created").await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].resource_id.as_deref(), Some(key_id.as_str()));
    assert_eq!(created[0].user_id, Some(ctx.owner.id));
}

#[tokio::test]
async fn test_api_key_scope_and_session_requirements() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let (_, key) = create_key(&ctx, &ctx.owner_token, &["members:read"]).await;

    let response = ctx
        .request(Method::GET, "/v1/audit-logs", Auth::Bearer(&key), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    let body = response.json();
    assert_eq!(body["error"], "insufficient_scope");
    assert_eq!(body["details"]["required_scope"], "audit:read");

    let response = ctx
        .request(
            Method::POST,
            "/v1/api-keys",
            Auth::Bearer(&key),
            Some(json!({ "name": "Child", "scopes": ["members:read"] })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.json()["error"], "forbidden");

    let denied = ctx.audit_entries("access_denied").await;
    assert_eq!(denied.len(), 2);
    assert!(denied.iter().all(|entry| entry.user_id.is_none() && entry.api_key_id.is_some()));
}

#[tokio::test]
async fn test_unknown_scope_is_rejected() {
    let ctx = TestContext::new(AccountTier::Pro).await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/api-keys",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "name": "Wild", "scopes": ["links:*"] })),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["error"], "validation_error");
}

#[tokio::test]
async fn test_regenerated_key_replaces_old_one() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let (key_id, old_key) = create_key(&ctx, &ctx.owner_token, &["members:read"]).await;

    let response = ctx
        .request(
            Method::POST,
            &format!("/v1/api-keys/{key_id}/regenerate"),
            Auth::Session(&ctx.owner_token),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    let new_key = response.json()["key"].as_str().unwrap().to_string();
    assert_ne!(new_key, old_key);

    let response = ctx
        .request(Method::GET, "/v1/members", Auth::Bearer(&old_key), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = ctx
        .request(Method::GET, "/v1/members", Auth::Bearer(&new_key), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_tier_change_unlocks_api_access() {
    let ctx = TestContext::new(AccountTier::Free).await;
    let body = json!({ "name": "Early", "scopes": ["links:read"] });

    let response = ctx
        .request(
            Method::POST,
            "/v1/api-keys",
            Auth::Session(&ctx.owner_token),
            Some(body.clone()),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.json()["message"].as_str().unwrap().contains("pro"));

    let response = ctx
        .request(
            Method::PUT,
            "/v1/account/tier",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "tier": "pro" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["tier"], "pro");

    let response = ctx
        .request(Method::POST, "/v1/api-keys", Auth::Session(&ctx.owner_token), Some(body))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let changed = ctx.audit_entries("account.tier_changed").await;
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].details["from"], "free");
    assert_eq!(changed[0].details["to"], "pro");
}

#[tokio::test]
async fn test_invite_rate_limit() {
    let limits = GateConfig {
        invite_limit: 2,
        ..GateConfig::default()
    };
    let ctx = TestContext::with_limits(AccountTier::Pro, limits).await;
    let real = ctx.outsider("real-person@example.com").await;

    for i in 0..2 {
        let response = ctx
            .request(
                Method::POST,
                "/v1/members",
                Auth::Session(&ctx.owner_token),
                Some(json!({ "email": format!("typo-{i}@example.com"), "role": "member" })),
            )
            .await;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    let response = ctx
        .request(
            Method::POST,
            "/v1/members",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "email": real.email, "role": "member" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers.get(header::RETRY_AFTER).is_none());
    let body = response.json();
    assert_eq!(body["error"], "rate_limited");
    assert!(body.get("details").is_none());

    assert_eq!(ctx.audit_entries("rate_limited").await.len(), 1);
    assert!(ctx.audit_entries("member.invited").await.is_empty());
}

#[tokio::test]
async fn test_invite_then_accept() {
    let ctx = TestContext::new(AccountTier::Free).await;
    let invitee = ctx.outsider("invitee@example.com").await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/members",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "email": "Invitee@Example.com", "role": "viewer" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    assert!(response.json()["accepted_at"].is_null());

    let token = common::session_token(invitee.id, ctx.account_id);
    let response = ctx
        .request(Method::POST, "/v1/members/accept", Auth::Session(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(!response.json()["accepted_at"].is_null());

    let response = ctx
        .request(
            Method::POST,
            "/v1/members",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "email": "invitee@example.com", "role": "viewer" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.json()["message"],
        "Unable to add member, verify the email address"
    );
}

#[tokio::test]
async fn test_audit_export_csv() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    create_key(&ctx, &ctx.owner_token, &["links:read"]).await;

    let response = ctx
        .request(
            Method::GET,
            "/v1/audit-logs/export?format=csv",
            Auth::Session(&ctx.owner_token),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert_eq!(
        response.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"audit-logs.csv\""
    );

    let mut lines = response.text.lines();
    assert_eq!(
        lines.next(),
        Some("id,created_at,action,resource_type,resource_id,user_id,api_key_id,details")
    );
    assert!(lines.any(|line| line.contains("api_key.created")));

    let exported = ctx.audit_entries("audit.exported").await;
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].details["format"], "csv");
    assert_eq!(exported[0].details["count"], 1);
}

#[tokio::test]
async fn test_audit_export_rejects_unknown_format() {
    let ctx = TestContext::new(AccountTier::Pro).await;

    let response = ctx
        .request(
            Method::GET,
            "/v1/audit-logs/export?format=xml",
            Auth::Session(&ctx.owner_token),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(ctx.audit_entries("audit.exported").await.is_empty());
}

#[tokio::test]
async fn test_audit_query_requires_pro() {
    let ctx = TestContext::new(AccountTier::Free).await;

    let response = ctx
        .request(Method::GET, "/v1/audit-logs", Auth::Session(&ctx.owner_token), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let denied = ctx.audit_entries("access_denied").await;
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].details["reason"], "feature_unavailable");
    assert_eq!(denied[0].details["feature"], "audit_log");
}

#[tokio::test]
async fn test_audit_query_clamps_page_size() {
    let ctx = TestContext::new(AccountTier::Pro).await;

    let response = ctx
        .request(
            Method::GET,
            "/v1/audit-logs?per_page=1000&page=0",
            Auth::Session(&ctx.owner_token),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["per_page"], 100);
    assert_eq!(body["page"], 1);
}

#[tokio::test]
async fn test_failed_credentials_are_throttled_per_ip() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let attacker = "203.0.113.9";

    for _ in 0..5 {
        let response = ctx
            .request_from(
                Method::GET,
                "/v1/account",
                Auth::Bearer("tg_guess:guess"),
                None,
                attacker,
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    // Blocked before any credential is checked, valid ones included
    let response = ctx
        .request_from(
            Method::GET,
            "/v1/account",
            Auth::Session(&ctx.owner_token),
            None,
            attacker,
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    let response = ctx
        .request_from(
            Method::GET,
            "/v1/account",
            Auth::Session(&ctx.owner_token),
            None,
            "198.51.100.7",
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_for_from_untrusted_peer_is_ignored() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let attacker = "203.0.113.9";
    let victim = "198.51.100.7";

    for i in 0..5 {
        let response = ctx
            .request_from(
                Method::GET,
                "/v1/account",
                Auth::Bearer("tg_guess:guess"),
                None,
                attacker,
                Some(&format!("10.1.0.{i}, {victim}")),
            )
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let response = ctx
        .request_from(
            Method::GET,
            "/v1/account",
            Auth::Bearer("tg_guess:guess"),
            None,
            attacker,
            Some("10.1.0.99"),
        )
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // Failures were not charged to the address the attacker claimed
    let response = ctx
        .request_from(
            Method::GET,
            "/v1/account",
            Auth::Session(&ctx.owner_token),
            None,
            victim,
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_trusted_proxy_reports_client_address() {
    let proxy = "10.0.0.1";
    let mut config = Config::for_testing(TEST_SECRET);
    config.api.trusted_proxies = vec![proxy.parse().unwrap()];
    let ctx = TestContext::with_config(AccountTier::Pro, config).await;

    let attacker = "203.0.113.9";
    let victim = "198.51.100.7";

    // The proxy appends the real client; the left-most hop is attacker-chosen
    for i in 0..5 {
        let response = ctx
            .request_from(
                Method::GET,
                "/v1/account",
                Auth::Bearer("tg_guess:guess"),
                None,
                proxy,
                Some(&format!("10.1.0.{i}, {attacker}")),
            )
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let response = ctx
        .request_from(
            Method::GET,
            "/v1/account",
            Auth::Session(&ctx.owner_token),
            None,
            proxy,
            Some(&format!("{victim}, {attacker}")),
        )
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // Another client behind the same proxy is unaffected
    let response = ctx
        .request_from(
            Method::GET,
            "/v1/account",
            Auth::Session(&ctx.owner_token),
            None,
            proxy,
            Some(victim),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_ownership_transfer() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let (admin, admin_token) = ctx.member(AccountRole::Admin).await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/account/transfer-ownership",
            Auth::Session(&admin_token),
            Some(json!({ "user_id": ctx.owner.id })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = ctx
        .request(
            Method::POST,
            "/v1/account/transfer-ownership",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "user_id": admin.id })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.json()["owner_id"], admin.id.to_string());

    let response = ctx
        .request(
            Method::PUT,
            "/v1/account/tier",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "tier": "agency" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = ctx
        .request(
            Method::PUT,
            "/v1/account/tier",
            Auth::Session(&admin_token),
            Some(json!({ "tier": "agency" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_owner_cannot_be_removed() {
    let ctx = TestContext::new(AccountTier::Free).await;

    let response = ctx
        .request(
            Method::DELETE,
            &format!("/v1/members/{}", ctx.owner.id),
            Auth::Session(&ctx.owner_token),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(ctx.audit_entries("member.removed").await.is_empty());
}

#[tokio::test]
async fn test_branding_requires_agency() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let patch = json!({ "login_page": { "headline": "Welcome back" }, "timezone": "UTC" });

    let response = ctx
        .request(
            Method::PATCH,
            "/v1/account/settings",
            Auth::Session(&ctx.owner_token),
            Some(patch.clone()),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    ctx.gate
        .resolver()
        .set_tier(ctx.account_id, AccountTier::Agency)
        .await
        .unwrap();

    let response = ctx
        .request(
            Method::PATCH,
            "/v1/account/settings",
            Auth::Session(&ctx.owner_token),
            Some(patch),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    let body = response.json();
    assert_eq!(body["login_page"]["headline"], "Welcome back");
    assert_eq!(body["timezone"], "UTC");
}

#[tokio::test]
async fn test_projects_visible_by_membership() {
    let ctx = TestContext::new(AccountTier::Agency).await;
    let (member, member_token) = ctx.member(AccountRole::Member).await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/projects",
            Auth::Session(&ctx.owner_token),
            Some(json!({ "name": "Client A" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
    let project_id = response.json()["id"].as_str().unwrap().to_string();

    // Members have no agency features by default
    let response = ctx
        .request(Method::GET, "/v1/projects", Auth::Session(&member_token), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = ctx
        .request(
            Method::PUT,
            &format!("/v1/members/{}/permissions", member.id),
            Auth::Session(&ctx.owner_token),
            Some(json!({ "projects": { "access": true } })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text);

    let response = ctx
        .request(Method::GET, "/v1/projects", Auth::Session(&member_token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.json()["projects"].as_array().unwrap().is_empty());

    let response = ctx
        .request(
            Method::POST,
            &format!("/v1/projects/{project_id}/members"),
            Auth::Session(&ctx.owner_token),
            Some(json!({ "user_id": member.id, "role": "admin" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

    let response = ctx
        .request(
            Method::POST,
            &format!("/v1/projects/{project_id}/members"),
            Auth::Session(&ctx.owner_token),
            Some(json!({ "user_id": member.id, "role": "member" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = ctx
        .request(Method::GET, "/v1/projects", Auth::Session(&member_token), None)
        .await;
    assert_eq!(response.json()["projects"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_features_for_session_and_key() {
    let ctx = TestContext::new(AccountTier::Pro).await;
    let (_, viewer_token) = ctx.member(AccountRole::Viewer).await;

    let response = ctx
        .request(Method::GET, "/v1/features", Auth::Session(&viewer_token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["tier"], "pro");
    assert_eq!(body["features"]["visitors"]["available"], true);
    assert_eq!(body["features"]["projects"]["available"], false);
    assert!(body["permissions"].is_object());

    let (_, key) = create_key(&ctx, &ctx.owner_token, &["members:read"]).await;
    let response = ctx
        .request(Method::GET, "/v1/features", Auth::Bearer(&key), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.json().get("permissions").is_none());
}
