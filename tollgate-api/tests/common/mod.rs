/// Common test utilities for integration tests
///
/// Builds the full router over in-memory backends and provides helpers to
/// create users, sessions and requests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value as JsonValue;
use tollgate_api::app::{build_router, AppState};
use tollgate_api::config::Config;
use tollgate_shared::auth::session::{create_session_token, SessionClaims};
use tollgate_shared::gate::{Gate, GateConfig};
use tollgate_shared::models::account::{AccountTier, CreateAccount};
use tollgate_shared::models::audit::{AuditFilter, AuditLogEntry};
use tollgate_shared::models::member::AccountRole;
use tollgate_shared::models::user::User;
use tollgate_shared::ratelimit::memory::MemoryCounterStore;
use tollgate_shared::store::memory::MemoryStore;
use tollgate_shared::store::AccountStore;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-session-secret-0123456789";

/// Peer address of requests that do not name one
pub const DEFAULT_PEER: &str = "192.0.2.10";

/// How a request authenticates
pub enum Auth<'a> {
    None,
    Session(&'a str),
    Bearer(&'a str),
}

/// Decoded response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl TestResponse {
    pub fn json(&self) -> JsonValue {
        serde_json::from_str(&self.text).expect("Response body is not JSON")
    }
}

/// Test context containing all necessary resources
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub gate: Gate,
    pub app: Router,
    pub account_id: Uuid,
    pub owner: User,
    pub owner_token: String,
}

impl TestContext {
    pub async fn new(tier: AccountTier) -> Self {
        Self::with_limits(tier, GateConfig::default()).await
    }

    pub async fn with_limits(tier: AccountTier, limits: GateConfig) -> Self {
        let mut config = Config::for_testing(TEST_SECRET);
        config.limits = limits;
        Self::with_config(tier, config).await
    }

    /// Creates a fresh account owned by a fresh user
    pub async fn with_config(tier: AccountTier, config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gate = Gate::new(
            store.clone(),
            Arc::new(MemoryCounterStore::new()),
            config.limits.clone(),
        );
        let app = build_router(AppState::new(gate.clone(), config));

        let owner = store
            .create_user(User::new(&format!("owner-{}@example.com", Uuid::new_v4()), None))
            .await
            .expect("Failed to create owner");

        let account = gate
            .resolver()
            .create_account(CreateAccount {
                name: "Test Account".to_string(),
                tier,
                owner_id: owner.id,
            })
            .await
            .expect("Failed to create account");

        let owner_token = session_token(owner.id, account.id);

        Self {
            store,
            gate,
            app,
            account_id: account.id,
            owner,
            owner_token,
        }
    }

    /// Adds an accepted member with `role` and returns their session token
    pub async fn member(&self, role: AccountRole) -> (User, String) {
        let user = self
            .store
            .create_user(User::new(&format!("member-{}@example.com", Uuid::new_v4()), None))
            .await
            .expect("Failed to create member");

        self.gate
            .resolver()
            .invite_member(self.account_id, &user.email, role)
            .await
            .expect("Failed to invite member");
        self.gate
            .resolver()
            .accept_invite(self.account_id, user.id)
            .await
            .expect("Failed to accept invite");

        let token = session_token(user.id, self.account_id);
        (user, token)
    }

    /// Creates a user who belongs to no account yet
    pub async fn outsider(&self, email: &str) -> User {
        self.store
            .create_user(User::new(email, None))
            .await
            .expect("Failed to create user")
    }

    pub async fn audit_entries(&self, action: &str) -> Vec<AuditLogEntry> {
        let filter = AuditFilter {
            action: Some(action.to_string()),
            ..Default::default()
        };
        self.gate
            .audit_log()
            .export(self.account_id, &filter)
            .await
            .expect("Failed to read audit log")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        auth: Auth<'_>,
        body: Option<JsonValue>,
    ) -> TestResponse {
        self.request_from(method, uri, auth, body, DEFAULT_PEER, None)
            .await
    }

    /// Sends a request through the router as if connected from `peer`,
    /// optionally with `X-Forwarded-For`
    pub async fn request_from(
        &self,
        method: Method,
        uri: &str,
        auth: Auth<'_>,
        body: Option<JsonValue>,
        peer: &str,
        forwarded_for: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);

        builder = match auth {
            Auth::None => builder,
            Auth::Session(token) => builder.header(header::COOKIE, format!("session={token}")),
            Auth::Bearer(key) => builder.header(header::AUTHORIZATION, format!("Bearer {key}")),
        };
        if let Some(ip) = forwarded_for {
            builder = builder.header("x-forwarded-for", ip);
        }

        let mut request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let peer: SocketAddr = format!("{peer}:40000").parse().expect("Invalid peer address");
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        TestResponse {
            status,
            headers,
            text: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

pub fn session_token(user_id: Uuid, account_id: Uuid) -> String {
    create_session_token(&SessionClaims::new(user_id, account_id), TEST_SECRET)
        .expect("Failed to create session token")
}
