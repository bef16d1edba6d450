//! # Tollgate API Server
//!
//! HTTP front of the authorization core. Every `/v1` request resolves an
//! actor (session cookie or API key) and runs through the gate, which
//! applies role, scope, tier and rate-limit checks and writes the audit log.
//!
//! ## Usage
//!
//! ```bash
//! SESSION_SECRET=$(openssl rand -hex 32) cargo run -p tollgate-api
//! ```
//!
//! Without `DATABASE_URL` / `REDIS_URL` the server falls back to in-memory
//! backends, which is only suitable for local development.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tollgate_api::app::{build_router, AppState};
use tollgate_api::config::Config;
use tollgate_shared::gate::Gate;
use tollgate_shared::ratelimit::memory::MemoryCounterStore;
use tollgate_shared::ratelimit::redis::RedisCounterStore;
use tollgate_shared::ratelimit::CounterStore;
use tollgate_shared::store::memory::MemoryStore;
use tollgate_shared::store::postgres::PgStore;
use tollgate_shared::store::Store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Tollgate API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match config.database.clone() {
        Some(db) => {
            let pg = PgStore::connect(db).await?;
            pg.run_migrations().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is not persisted)");
            Arc::new(MemoryStore::new())
        }
    };

    let counters: Arc<dyn CounterStore> = match config.redis.clone() {
        Some(redis) => Arc::new(RedisCounterStore::connect(redis).await?),
        None => {
            tracing::warn!("REDIS_URL not set, rate-limit counters are per-process");
            Arc::new(MemoryCounterStore::new())
        }
    };

    let gate = Gate::new(store, counters, config.limits.clone());
    let addr = config.bind_address();
    let app = build_router(AppState::new(gate, config));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tollgate_api=debug,tollgate_shared=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
