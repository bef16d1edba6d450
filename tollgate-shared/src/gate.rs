/// Authorization façade
///
/// Every protected operation runs through [`Gate::run`]:
///
/// ```text
/// actor ─► account active? ─► role / scope / feature ─► rate limit ─► body ─► audit(success)
///                 │                    │                     │
///                 └──── audit(access_denied) + Forbidden     └── audit(rate_limited) + RateLimited
/// ```
///
/// Each call produces exactly one audit entry when it succeeds or is denied.
/// Failures inside the body are returned as-is without an extra entry, and
/// services called from a body never write audit entries themselves.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tollgate_shared::auth::actor::{Actor, RequestContext};
/// use tollgate_shared::gate::{Executed, Gate, GateConfig, Operation};
/// use tollgate_shared::models::account::{AccountTier, CreateAccount};
/// use tollgate_shared::models::member::AccountRole;
/// use tollgate_shared::ratelimit::memory::MemoryCounterStore;
/// use tollgate_shared::store::memory::MemoryStore;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), tollgate_shared::GateError> {
/// let gate = Gate::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(MemoryCounterStore::new()),
///     GateConfig::default(),
/// );
///
/// let owner = Uuid::new_v4();
/// let account = gate
///     .resolver()
///     .create_account(CreateAccount { name: "Acme".into(), tier: AccountTier::Free, owner_id: owner })
///     .await?;
///
/// let ctx = RequestContext::new(Actor::user(owner, account.id), None);
/// let op = Operation::new("report.generated", "report").min_role(AccountRole::Admin);
/// let answer = gate.run(&ctx, op, || async { Ok(Executed::new(42)) }).await?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{self, AuditLog, DEFAULT_MAX_PAGE_SIZE};
use crate::auth::actor::{Actor, RequestContext};
use crate::auth::authorization::RoleResolver;
use crate::credentials::CredentialStore;
use crate::error::{GateError, GateResult};
use crate::features::{self, Feature};
use crate::models::account::{Account, AccountStatus};
use crate::models::member::AccountRole;
use crate::ratelimit::{CounterStore, RateLimitKey, RateLimitRule, RateLimiter};
use crate::store::Store;

pub const INVITE_ACTION: &str = "team_invite";
pub const LOGIN_ACTION: &str = "login";

/// Limits applied by the façade
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub invite_limit: u64,
    pub invite_window_secs: u64,
    pub login_limit: u64,
    pub login_window_secs: u64,
    pub audit_max_page_size: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            invite_limit: 10,
            invite_window_secs: 3600,
            login_limit: 5,
            login_window_secs: 900,
            audit_max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

/// Descriptor of one protected call
#[derive(Debug, Clone)]
pub struct Operation {
    /// Audit action recorded on success
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// Minimum account role for session actors
    pub min_role: AccountRole,
    pub owner_only: bool,
    pub feature: Option<Feature>,
    /// Scope an API key must hold; `None` means session actors only
    pub scope: Option<String>,
    pub rate_limit: Option<RateLimitRule>,
}

impl Operation {
    pub fn new(action: &str, resource_type: &str) -> Self {
        Self {
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: None,
            min_role: AccountRole::Viewer,
            owner_only: false,
            feature: None,
            scope: None,
            rate_limit: None,
        }
    }

    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn min_role(mut self, role: AccountRole) -> Self {
        self.min_role = role;
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.owner_only = true;
        self
    }

    pub fn feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }

    pub fn scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    pub fn rate_limit(mut self, rule: RateLimitRule) -> Self {
        self.rate_limit = Some(rule);
        self
    }
}

/// Result of an operation body plus what to record about it
#[derive(Debug, Clone)]
pub struct Executed<T> {
    pub value: T,
    pub resource_id: Option<String>,
    pub details: Option<JsonValue>,
}

impl<T> Executed<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            resource_id: None,
            details: None,
        }
    }

    pub fn with_resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

/// Why a call was refused, before it is audited
struct Denial {
    reason: &'static str,
    details: Map<String, JsonValue>,
    error: GateError,
}

impl Denial {
    fn forbidden(reason: &'static str, message: String) -> Self {
        Self {
            reason,
            details: Map::new(),
            error: GateError::Forbidden(message),
        }
    }

    fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// The authorization façade and the services it composes
#[derive(Clone)]
pub struct Gate {
    resolver: RoleResolver,
    credentials: CredentialStore,
    limiter: RateLimiter,
    audit: AuditLog,
    config: GateConfig,
}

impl Gate {
    pub fn new(store: Arc<dyn Store>, counters: Arc<dyn CounterStore>, config: GateConfig) -> Self {
        Self {
            resolver: RoleResolver::new(store.clone()),
            credentials: CredentialStore::new(store.clone()),
            limiter: RateLimiter::new(counters),
            audit: AuditLog::new(store, config.audit_max_page_size),
            config,
        }
    }

    pub fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// `team_invite` rule keyed by account and actor
    pub fn invite_rule(&self) -> RateLimitRule {
        RateLimitRule::new(
            INVITE_ACTION,
            self.config.invite_limit,
            self.config.invite_window_secs,
            RateLimitKey::AccountActor,
        )
    }

    /// Runs `body` if the actor may perform `op`, then records the outcome
    ///
    /// # Errors
    ///
    /// - `Forbidden` / `InsufficientScope`: audited as `access_denied`
    /// - `RateLimited`: audited as `rate_limited`
    /// - `NotFound`: the actor's account does not exist (not audited)
    /// - any error returned by `body`, unaudited
    pub async fn run<T, F, Fut>(&self, ctx: &RequestContext, op: Operation, body: F) -> GateResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GateResult<Executed<T>>>,
    {
        self.authorize(ctx, &op).await?;

        if let Some(rule) = &op.rate_limit {
            let identifier = rate_limit_identifier(ctx, rule.key);
            let allowed = self
                .limiter
                .check(&rule.action, &identifier, rule.limit, rule.window_seconds)
                .await?;

            if !allowed {
                warn!(
                    account_id = %ctx.account_id(),
                    actor = %ctx.actor.identifier(),
                    limit_action = %rule.action,
                    "Rate limit denied request"
                );
                let details = json!({
                    "reason": "rate_limit_exceeded",
                    "limit_action": rule.action,
                    "attempted_action": op.action,
                });
                self.record(ctx, audit::RATE_LIMITED, &op.resource_type, op.resource_id.clone(), Some(details))
                    .await?;
                return Err(GateError::RateLimited);
            }
        }

        let executed = body().await?;

        let resource_id = executed.resource_id.or(op.resource_id);
        self.record(ctx, &op.action, &op.resource_type, resource_id.clone(), executed.details)
            .await?;

        info!(
            account_id = %ctx.account_id(),
            actor = %ctx.actor.identifier(),
            action = %op.action,
            resource_id = ?resource_id,
            "Operation completed"
        );

        Ok(executed.value)
    }

    /// Resolves a `key_id:secret` credential to a request context
    pub async fn resolve_api_key(
        &self,
        presented: &str,
        source_ip: Option<String>,
    ) -> GateResult<RequestContext> {
        let key = self
            .credentials
            .validate(presented, source_ip.clone())
            .await?
            .ok_or_else(|| GateError::Unauthenticated("Invalid API key".to_string()))?;

        Ok(RequestContext::new(Actor::from_api_key(&key), source_ip))
    }

    /// Counts a login attempt against the source IP
    ///
    /// Nothing is audited: no account is known before authentication.
    pub async fn check_login_attempt(&self, source_ip: &str) -> GateResult<()> {
        let allowed = self
            .limiter
            .check(
                LOGIN_ACTION,
                source_ip,
                self.config.login_limit,
                self.config.login_window_secs,
            )
            .await?;

        if !allowed {
            warn!(source_ip = %source_ip, "Login attempts rate limited");
            return Err(GateError::RateLimited);
        }
        Ok(())
    }

    async fn record(
        &self,
        ctx: &RequestContext,
        action: &str,
        resource_type: &str,
        resource_id: Option<String>,
        details: Option<JsonValue>,
    ) -> GateResult<Uuid> {
        self.audit
            .log(
                ctx.account_id(),
                action,
                resource_type,
                resource_id,
                details,
                Some(ctx.actor.audit_actor()),
            )
            .await
    }

    /// Role, scope and feature checks; denials are audited here
    async fn authorize(&self, ctx: &RequestContext, op: &Operation) -> GateResult<Account> {
        let account = self.resolver.get_account(ctx.account_id()).await?;

        let denial = match self.evaluate(ctx, op, &account).await? {
            None => return Ok(account),
            Some(denial) => denial,
        };

        warn!(
            account_id = %account.id,
            actor = %ctx.actor.identifier(),
            action = %op.action,
            reason = denial.reason,
            "Access denied"
        );

        let mut details = denial.details;
        details.insert("reason".to_string(), JsonValue::from(denial.reason));
        details.insert("attempted_action".to_string(), JsonValue::from(op.action.clone()));

        self.record(
            ctx,
            audit::ACCESS_DENIED,
            &op.resource_type,
            op.resource_id.clone(),
            Some(JsonValue::Object(details)),
        )
        .await?;

        Err(denial.error)
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        op: &Operation,
        account: &Account,
    ) -> GateResult<Option<Denial>> {
        if account.status == AccountStatus::Suspended {
            return Ok(Some(Denial::forbidden(
                "account_suspended",
                "Account is suspended".to_string(),
            )));
        }

        if let Some(feature) = op.feature {
            if !feature.available_at(account.tier) {
                return Ok(Some(
                    Denial::forbidden(
                        "feature_unavailable",
                        format!(
                            "{} requires the {} plan",
                            feature.display_name(),
                            feature.tier().as_str()
                        ),
                    )
                    .with("feature", feature.as_str()),
                ));
            }
        }

        match &ctx.actor {
            Actor::User { user_id, .. } => {
                let Some(member) = self.resolver.get_member(account.id, *user_id).await? else {
                    return Ok(Some(Denial::forbidden(
                        "not_a_member",
                        "Not a member of this account".to_string(),
                    )));
                };

                if op.owner_only && member.role != AccountRole::Owner {
                    return Ok(Some(Denial::forbidden(
                        "owner_required",
                        "Only the account owner can do this".to_string(),
                    )));
                }

                if !member.role.has_permission(op.min_role) {
                    return Ok(Some(
                        Denial::forbidden(
                            "insufficient_role",
                            format!("Requires {} role or higher", op.min_role.as_str()),
                        )
                        .with("required_role", op.min_role.as_str()),
                    ));
                }

                if let Some(feature) = op.feature {
                    let allowed = features::resolve_permission(
                        account.tier,
                        member.role,
                        &member.permissions,
                        feature,
                    );
                    if !allowed {
                        return Ok(Some(
                            Denial::forbidden(
                                "feature_denied",
                                format!("No access to {}", feature.display_name()),
                            )
                            .with("feature", feature.as_str()),
                        ));
                    }
                }
            }
            Actor::ApiKey { scopes, .. } => {
                let Some(required) = &op.scope else {
                    return Ok(Some(Denial::forbidden(
                        "session_required",
                        "This operation requires a user session".to_string(),
                    )));
                };

                if op.owner_only {
                    return Ok(Some(Denial::forbidden(
                        "owner_required",
                        "Only the account owner can do this".to_string(),
                    )));
                }

                if !crate::auth::api_key::has_scope(scopes, required) {
                    return Ok(Some(Denial {
                        reason: "insufficient_scope",
                        details: Map::new(),
                        error: GateError::InsufficientScope(required.clone()),
                    }
                    .with("scope", required.as_str())));
                }
            }
        }

        Ok(None)
    }
}

fn rate_limit_identifier(ctx: &RequestContext, key: RateLimitKey) -> String {
    match key {
        RateLimitKey::AccountActor => format!("{}:{}", ctx.account_id(), ctx.actor.identifier()),
        RateLimitKey::SourceIp => ctx
            .source_ip
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
    }
}
