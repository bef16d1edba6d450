/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tollgate_api::{app::{build_router, AppState}, config::Config};
/// use tollgate_shared::gate::Gate;
/// use tollgate_shared::ratelimit::memory::MemoryCounterStore;
/// use tollgate_shared::store::memory::MemoryStore;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let gate = Gate::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(MemoryCounterStore::new()),
///     config.limits.clone(),
/// );
/// let app = build_router(AppState::new(gate, config));
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, patch, post, put},
    Router,
};
use tollgate_shared::gate::Gate;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::Config;
use crate::middleware::{actor::resolve_actor, security::SecurityHeadersLayer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gate: Gate,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(gate: Gate, config: Config) -> Self {
        Self {
            gate,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete router
///
/// ```text
/// /
/// ├── GET /health
/// └── /v1/                                 (actor resolution)
///     ├── GET    /features
///     ├── GET    /account
///     ├── PATCH  /account/settings
///     ├── PUT    /account/tier
///     ├── POST   /account/transfer-ownership
///     ├── GET    /members   POST /members   POST /members/accept
///     ├── PATCH  /members/:user_id   DELETE /members/:user_id
///     ├── PUT    /members/:user_id/permissions
///     ├── GET    /projects  POST /projects
///     ├── POST   /projects/:id/move
///     ├── POST   /projects/:id/members   DELETE /projects/:id/members/:user_id
///     ├── GET    /api-keys  POST /api-keys
///     ├── POST   /api-keys/:key_id/revoke
///     ├── POST   /api-keys/:key_id/regenerate
///     ├── GET    /audit-logs
///     └── GET    /audit-logs/export
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let v1_routes = Router::new()
        .route("/features", get(routes::features::get_features))
        .route("/account", get(routes::account::get_account))
        .route("/account/settings", patch(routes::account::update_settings))
        .route("/account/tier", put(routes::account::change_tier))
        .route(
            "/account/transfer-ownership",
            post(routes::account::transfer_ownership),
        )
        .route(
            "/members",
            get(routes::members::list_members).post(routes::members::invite_member),
        )
        .route("/members/accept", post(routes::members::accept_invite))
        .route(
            "/members/:user_id",
            patch(routes::members::change_role).delete(routes::members::remove_member),
        )
        .route(
            "/members/:user_id/permissions",
            put(routes::members::set_permissions),
        )
        .route(
            "/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route("/projects/:id/move", post(routes::projects::move_project))
        .route(
            "/projects/:id/members",
            post(routes::projects::add_project_member),
        )
        .route(
            "/projects/:id/members/:user_id",
            delete(routes::projects::remove_project_member),
        )
        .route(
            "/api-keys",
            get(routes::api_keys::list_api_keys).post(routes::api_keys::create_api_key),
        )
        .route(
            "/api-keys/:key_id/revoke",
            post(routes::api_keys::revoke_api_key),
        )
        .route(
            "/api-keys/:key_id/regenerate",
            post(routes::api_keys::regenerate_api_key),
        )
        .route("/audit-logs", get(routes::audit_logs::query_audit_logs))
        .route(
            "/audit-logs/export",
            get(routes::audit_logs::export_audit_logs),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resolve_actor,
        ));

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    };

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
